pub mod ecg;
pub mod pvc;
