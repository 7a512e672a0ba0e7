pub mod latch;
