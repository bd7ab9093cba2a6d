mod basic;
mod dead_detection;
mod early_refill;
mod racing;
mod shutdown;
mod stale_batch;
