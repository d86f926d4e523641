pub mod backfill;
pub mod jobs;
pub mod search;
