pub mod ise;
