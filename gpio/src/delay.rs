use std::fmt::Debug;
use std::thread::sleep;
use std::time::Duration;

/// Blocking millisecond delays.
///
/// Every wait of the LCD protocol goes through this, so a fake clock can record the requested
/// durations instead of sleeping.
pub trait Delay: Debug + Send + Sync {
    fn delay_ms(&self, ms: u32);
}

/// Sleeps the current thread.
#[derive(Copy, Clone, Debug, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay_ms(&self, ms: u32) {
        sleep(Duration::from_millis(ms.into()));
    }
}
