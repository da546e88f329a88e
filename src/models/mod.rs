pub mod mobil;
pub mod pelanggan;
pub mod role;
pub mod status;
pub mod transaksi;
pub mod user;
