pub mod mpesa;
