pub mod rescue;
pub mod roster;
