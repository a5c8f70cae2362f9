pub mod group_client;
