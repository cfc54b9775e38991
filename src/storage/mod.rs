pub mod certificate_records;
pub mod institutions;
pub mod ipfs_client;
