pub mod legend;
pub mod trace;
