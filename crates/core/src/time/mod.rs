pub mod clock;
pub mod periods;
