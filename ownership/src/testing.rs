//! Payloads that record their own destruction.

use std::sync::{Arc, atomic::{AtomicUsize, Ordering::SeqCst}};

/// Install a test logger, so that `RUST_LOG=trace` shows handle activity.
pub fn init_logging()
{
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Counts how many payloads created from it have been dropped.
#[derive(Clone, Debug, Default)]
pub struct DropCounter
{
    drops: Arc<AtomicUsize>,
}

impl DropCounter
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn payload(&self, value: i32) -> Payload
    {
        Payload{value, drops: self.drops.clone()}
    }

    pub fn boxed(&self, value: i32) -> Box<Payload>
    {
        Box::new(self.payload(value))
    }

    pub fn drops(&self) -> usize
    {
        self.drops.load(SeqCst)
    }
}

#[derive(Debug)]
pub struct Payload
{
    pub value: i32,
    drops: Arc<AtomicUsize>,
}

impl Drop for Payload
{
    fn drop(&mut self)
    {
        self.drops.fetch_add(1, SeqCst);
    }
}
