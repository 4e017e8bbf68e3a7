use time::{Duration, OffsetDateTime};

/// Server clock that never hands out the same instant twice.
#[derive(Debug, Default)]
pub(crate) struct ServerClock {
    last: Option<OffsetDateTime>,
}

impl ServerClock {
    pub(crate) fn tick(&mut self) -> OffsetDateTime {
        let mut now = OffsetDateTime::now_utc();
        if let Some(last) = self.last {
            if now <= last {
                now = last + Duration::nanoseconds(1);
            }
        }
        self.last = Some(now);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing() {
        let mut clock = ServerClock::default();
        let mut prev = clock.tick();
        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next > prev);
            prev = next;
        }
    }
}
