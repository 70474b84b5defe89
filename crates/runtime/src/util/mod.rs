mod threadpool;

pub use threadpool::*;
