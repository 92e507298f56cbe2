use std::time::Duration;

use tokio::{
    sync::{Mutex, Semaphore, SemaphorePermit},
    time::{sleep_until, Instant},
};

/// 限制對同一主機的請求頻率。
///
/// 同時進行中的請求數由 semaphore 控制，
/// 兩次請求開始的時間間隔至少為 `interval`。
pub struct Pacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
    permits: Semaphore,
}

impl Pacer {
    pub fn new(interval: Duration, max_in_flight: usize) -> Self {
        Pacer {
            interval,
            next_slot: Mutex::new(None),
            permits: Semaphore::new(max_in_flight.max(1)),
        }
    }

    /// 不等待，測試時使用
    pub fn unthrottled() -> Self {
        Self::new(Duration::ZERO, Semaphore::MAX_PERMITS)
    }

    /// 取得發送請求的許可，持有期間佔用一個並發名額
    pub async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        let permit = self.permits.acquire().await.ok();

        if !self.interval.is_zero() {
            let mut next_slot = self.next_slot.lock().await;
            if let Some(at) = *next_slot {
                if at > Instant::now() {
                    sleep_until(at).await;
                }
            }
            *next_slot = Some(Instant::now() + self.interval);
        }

        permit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_minimum_interval() {
        let pacer = Pacer::new(Duration::from_millis(40), 1);
        let start = Instant::now();
        for _ in 0..3 {
            let _permit = pacer.acquire().await;
        }
        // 第一次不需等待，之後兩次各至少 40ms
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_unthrottled() {
        let pacer = Pacer::unthrottled();
        let start = Instant::now();
        for _ in 0..100 {
            assert!(pacer.acquire().await.is_some());
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_in_flight_bound() {
        let pacer = Pacer::new(Duration::ZERO, 1);
        let first = pacer.acquire().await;
        assert!(first.is_some());
        assert_eq!(pacer.permits.available_permits(), 0);
        drop(first);
        assert_eq!(pacer.permits.available_permits(), 1);
    }
}
