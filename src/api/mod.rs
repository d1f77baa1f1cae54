pub mod fields;
pub mod resource;
pub mod serializers;
pub mod server;
