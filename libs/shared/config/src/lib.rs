use std::env;
use std::str::FromStr;
use tracing::warn;

/// How post-mutation side effects (email, notification, calendar) are carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffectMode {
    /// Run side effects in the request and report their failure to the caller.
    Inline,
    /// Queue side effects for the outbox worker; the response reflects only the mutation.
    Outbox,
}

impl FromStr for SideEffectMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(SideEffectMode::Inline),
            "outbox" => Ok(SideEffectMode::Outbox),
            other => Err(format!("Unknown side effect mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from_address: String,
    pub calendar_api_url: String,
    pub redis_url: Option<String>,
    pub side_effect_mode: SideEffectMode,
    pub serialize_bookings: bool,
    pub outbox_max_retries: u32,
    pub outbox_retry_delay_seconds: u64,
    pub api_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            email_api_url: env::var("EMAIL_API_URL")
                .unwrap_or_else(|_| {
                    warn!("EMAIL_API_URL not set, using empty value");
                    String::new()
                }),
            email_api_key: env::var("EMAIL_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("EMAIL_API_KEY not set, using empty value");
                    String::new()
                }),
            email_from_address: env::var("EMAIL_FROM_ADDRESS")
                .unwrap_or_else(|_| {
                    warn!("EMAIL_FROM_ADDRESS not set, using default");
                    "appointments@vetclinic.local".to_string()
                }),
            calendar_api_url: env::var("CALENDAR_API_URL")
                .unwrap_or_else(|_| {
                    warn!("CALENDAR_API_URL not set, using default");
                    "https://www.googleapis.com/calendar/v3".to_string()
                }),
            redis_url: env::var("REDIS_URL").ok(),
            side_effect_mode: env::var("SIDE_EFFECT_MODE")
                .ok()
                .and_then(|value| {
                    value.parse().map_err(|e: String| warn!("{}, falling back to inline", e)).ok()
                })
                .unwrap_or(SideEffectMode::Inline),
            serialize_bookings: env::var("SERIALIZE_BOOKINGS")
                .map(|value| value != "false" && value != "0")
                .unwrap_or(true),
            outbox_max_retries: parse_or("OUTBOX_MAX_RETRIES", 5),
            outbox_retry_delay_seconds: parse_or("OUTBOX_RETRY_DELAY_SECONDS", 5),
            api_port: parse_or("API_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        if config.side_effect_mode == SideEffectMode::Outbox && config.redis_url.is_none() {
            warn!("SIDE_EFFECT_MODE=outbox without REDIS_URL - outbox will not survive restarts");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_email_configured(&self) -> bool {
        !self.email_api_url.is_empty() && !self.email_api_key.is_empty()
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_effect_mode_parses_case_insensitively() {
        assert_eq!("Outbox".parse::<SideEffectMode>(), Ok(SideEffectMode::Outbox));
        assert_eq!(" inline ".parse::<SideEffectMode>(), Ok(SideEffectMode::Inline));
        assert!("queue".parse::<SideEffectMode>().is_err());
    }
}
