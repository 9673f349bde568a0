pub mod efficiency;
pub mod gfunction;
pub mod ground;
pub mod load;
pub mod optimizer;
pub mod resistance;
pub mod sizing;
pub mod temperature;
pub mod units;
