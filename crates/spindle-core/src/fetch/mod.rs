//! Fetching jobs off queues and holding them under a lease.

mod fetcher;
mod lease;

pub use fetcher::JobFetcher;
pub use lease::FetchedJob;
