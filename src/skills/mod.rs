pub mod detector;
pub mod effective;
pub mod experience;
