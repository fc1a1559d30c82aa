//! The two queueing disciplines composed in series: an unbounded FIFO for
//! unclassified work and a bounded priority queue for dispatch-ready work.

pub mod ranked;
pub mod unranked;

pub use ranked::RankedQueue;
pub use unranked::UnrankedQueue;
