pub mod in_memory;
pub mod storefront_client;
