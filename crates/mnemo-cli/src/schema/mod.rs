pub mod classification;
pub mod coefficients;
pub mod selection;
pub mod views;
