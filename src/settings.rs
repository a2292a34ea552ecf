// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Settings Provider (C1): a typed view over the raw `string -> string`
//! settings map, re-parsed once per tick with documented defaults on parse
//! failure.

use std::collections::HashMap;

/// Per-sink cadence knobs consumed by the alert scheduler (C5).
#[derive(Debug, Clone, Copy)]
pub struct SinkSettings {
    pub enabled: bool,
    pub first_alert_delay_minutes: i64,
    pub alert_frequency_minutes: i64,
    pub mute_after_n_alerts: i64,
}

/// A fully-parsed snapshot of the settings table for one tick.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub mail: SinkSettings,
    pub mail_server: String,
    pub mail_port: u16,
    pub mail_user: String,
    pub mail_pass: String,
    pub mail_recipients: Vec<String>,

    pub telegram: SinkSettings,
    pub telegram_bot_token: String,
    pub telegram_chat_ids: Vec<String>,
    pub telegram_proxy: Option<String>,
}

fn get<'a>(map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    map.get(key).map(String::as_str)
}

fn get_bool(map: &HashMap<String, String>, key: &str) -> bool {
    get(map, key).map(|v| v == "true").unwrap_or(false)
}

fn get_int(map: &HashMap<String, String>, key: &str, default: i64) -> i64 {
    get(map, key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn get_string(map: &HashMap<String, String>, key: &str, default: &str) -> String {
    get(map, key).map(str::to_string).unwrap_or_else(|| default.to_string())
}

fn split_csv_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl EngineSettings {
    /// Parse a tick's settings snapshot from the raw map. Missing or
    /// non-numeric values fall back to the same constants seeded as defaults
    /// on first start, so a partially-edited settings table never panics or
    /// disables the engine outright.
    pub fn parse(map: &HashMap<String, String>) -> Self {
        let mail = SinkSettings {
            enabled: get_bool(map, "MAIL_ENABLED"),
            first_alert_delay_minutes: get_int(map, "MAIL_FIRST_ALERT_DELAY_MINUTES", 1),
            alert_frequency_minutes: get_int(map, "MAIL_ALERT_FREQUENCY_MINUTES", 60),
            mute_after_n_alerts: get_int(map, "MAIL_MUTE_AFTER_N_ALERTS", 3),
        };
        let telegram = SinkSettings {
            enabled: get_bool(map, "TELEGRAM_ENABLED"),
            first_alert_delay_minutes: get_int(map, "TELEGRAM_FIRST_ALERT_DELAY_MINUTES", 1),
            alert_frequency_minutes: get_int(map, "TELEGRAM_ALERT_FREQUENCY_MINUTES", 30),
            mute_after_n_alerts: get_int(map, "TELEGRAM_MUTE_AFTER_N_ALERTS", 3),
        };

        let mail_port = get_int(map, "MAIL_PORT", 587).clamp(1, u16::MAX as i64) as u16;
        let proxy = get_string(map, "TELEGRAM_PROXY", "");

        Self {
            mail,
            mail_server: get_string(map, "MAIL_SERVER", "smtp.gmail.com"),
            mail_port,
            mail_user: get_string(map, "MAIL_USER", "email@gmail.com"),
            mail_pass: get_string(map, "MAIL_PASS", "password"),
            mail_recipients: split_csv_list(&get_string(map, "MAIL_RECIPIENTS", "admin@example.com")),

            telegram,
            telegram_bot_token: get_string(map, "TELEGRAM_BOT_TOKEN", ""),
            telegram_chat_ids: split_csv_list(&get_string(map, "TELEGRAM_CHAT_IDS", "")),
            telegram_proxy: if proxy.is_empty() { None } else { Some(proxy) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_documented_defaults() {
        let settings = EngineSettings::parse(&HashMap::new());
        assert!(!settings.mail.enabled);
        assert_eq!(settings.mail.first_alert_delay_minutes, 1);
        assert_eq!(settings.mail.alert_frequency_minutes, 60);
        assert_eq!(settings.mail.mute_after_n_alerts, 3);
        assert_eq!(settings.mail_port, 587);
        assert!(settings.telegram_chat_ids.is_empty());
        assert!(settings.telegram_proxy.is_none());
    }

    #[test]
    fn non_numeric_value_falls_back_instead_of_panicking() {
        let mut map = HashMap::new();
        map.insert("MAIL_PORT".to_string(), "not-a-number".to_string());
        let settings = EngineSettings::parse(&map);
        assert_eq!(settings.mail_port, 587);
    }

    #[test]
    fn csv_lists_are_trimmed_and_filtered() {
        let mut map = HashMap::new();
        map.insert("TELEGRAM_CHAT_IDS".to_string(), " 111, 222 ,,333".to_string());
        let settings = EngineSettings::parse(&map);
        assert_eq!(settings.telegram_chat_ids, vec!["111", "222", "333"]);
    }
}
