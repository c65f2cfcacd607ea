use crate::config::SecurityConfig;
use crate::game::{GameError, PlayerId};
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// 猜词频率限制与输入校验
pub struct Security {
    guess_limits: DashMap<PlayerId, RateLimiter>,
    guess_window: Duration,
    guess_max_actions: u32,
    max_name_length: usize,
}

struct RateLimiter {
    window_start: Instant,
    count: u32,
    window: Duration,
    max_actions: u32,
}

impl RateLimiter {
    fn new(window: Duration, max_actions: u32, now: Instant) -> Self {
        RateLimiter {
            window_start: now,
            count: 0,
            window,
            max_actions,
        }
    }

    fn check(&mut self, now: Instant) -> bool {
        if now.duration_since(self.window_start) > self.window {
            self.count = 0;
            self.window_start = now;
        }

        if self.count >= self.max_actions {
            false
        } else {
            self.count += 1;
            true
        }
    }
}

impl Security {
    pub fn new(config: &SecurityConfig) -> Self {
        Security {
            guess_limits: DashMap::new(),
            guess_window: config.guess_window(),
            guess_max_actions: config.guess_max_actions,
            max_name_length: config.max_name_length,
        }
    }

    pub fn check_guess_rate(&self, player_id: &str) -> Result<(), GameError> {
        self.check_guess_rate_at(player_id, Instant::now())
    }

    fn check_guess_rate_at(&self, player_id: &str, now: Instant) -> Result<(), GameError> {
        let mut limiter = self
            .guess_limits
            .entry(player_id.to_string())
            .or_insert_with(|| RateLimiter::new(self.guess_window, self.guess_max_actions, now));

        if limiter.check(now) {
            Ok(())
        } else {
            Err(GameError::RateLimited)
        }
    }

    /// 玩家离开后清理计数
    pub fn forget(&self, player_id: &str) {
        self.guess_limits.remove(player_id);
    }

    /// 校验并规范化玩家名称
    pub fn validate_player_name(&self, name: &str) -> Result<String, GameError> {
        let name = name.trim();

        if name.is_empty() {
            return Err(GameError::InvalidName("名称不能为空".to_string()));
        }

        if name.chars().count() > self.max_name_length {
            return Err(GameError::InvalidName(format!(
                "名称长度不能超过 {} 个字符",
                self.max_name_length
            )));
        }

        if name.chars().any(char::is_control) {
            return Err(GameError::InvalidName("名称包含控制字符".to_string()));
        }

        Ok(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security() -> Security {
        Security::new(&SecurityConfig {
            guess_window_ms: 1000,
            guess_max_actions: 2,
            max_name_length: 8,
        })
    }

    #[test]
    fn rate_limit_resets_after_window() {
        let security = security();
        let start = Instant::now();

        assert!(security.check_guess_rate_at("p1", start).is_ok());
        assert!(security.check_guess_rate_at("p1", start).is_ok());
        assert_eq!(
            security.check_guess_rate_at("p1", start),
            Err(GameError::RateLimited)
        );
        // 其他玩家互不影响
        assert!(security.check_guess_rate_at("p2", start).is_ok());

        let later = start + Duration::from_millis(1500);
        assert!(security.check_guess_rate_at("p1", later).is_ok());
    }

    #[test]
    fn forget_clears_limit() {
        let security = security();
        let now = Instant::now();
        for _ in 0..2 {
            security.check_guess_rate_at("p1", now).unwrap();
        }
        security.forget("p1");
        assert!(security.check_guess_rate_at("p1", now).is_ok());
    }

    #[test]
    fn player_names() {
        let security = security();
        assert_eq!(security.validate_player_name("  Ann ").unwrap(), "Ann");
        assert!(security.validate_player_name("   ").is_err());
        assert!(security.validate_player_name("abcdefghi").is_err());
        assert!(security.validate_player_name("a\u{7}b").is_err());
        // 按字符计数
        assert_eq!(security.validate_player_name("午安午安").unwrap(), "午安午安");
    }
}
