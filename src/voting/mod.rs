pub mod majority;
pub mod scrutiny;

pub use majority::{majority_threshold, resolve, Decision};
pub use scrutiny::{count_ballots, TallyEntry};
