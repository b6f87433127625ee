pub mod glucose;
pub mod heart_rate;
pub mod hrv;
pub mod sqi;
