//! Unit conversion factors. Internally all lengths are in Bohr.

pub const BOHR2ANG: f64 = 0.529_177_210_67;
pub const ANG2BOHR: f64 = 1.0 / BOHR2ANG;
