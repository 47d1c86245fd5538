use crate::app::args::Args;

use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct Settings {
    #[builder(setter(into))]
    pub backend_url: String,
    #[builder(setter(into))]
    pub rtc_url: String,
    #[builder(default)]
    pub caller_number: Option<String>,
    #[builder(default = "warn".to_owned())]
    pub rtc_log: String,
}

impl Settings {
    pub fn from_args(args: Args) -> Self {
        Self {
            backend_url: args.backend_url,
            rtc_url: args.rtc_url,
            caller_number: args.caller_number,
            rtc_log: args.rtc_log,
        }
    }

    /// Raw gateway notifications are only worth logging when explicitly
    /// asked for.
    pub fn log_gateway_notifications(&self) -> bool {
        self.rtc_log.eq_ignore_ascii_case("debug")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_builder_defaults_match_the_cli_defaults() {
        let settings = Settings::builder()
            .backend_url("http://backend")
            .rtc_url("http://gateway")
            .build();
        assert_eq!(settings.rtc_log, "warn");
        assert!(settings.caller_number.is_none());
        assert!(!settings.log_gateway_notifications());
    }

    #[test]
    fn debug_level_enables_notification_logging() {
        let settings = Settings::builder()
            .backend_url("http://backend")
            .rtc_url("http://gateway")
            .rtc_log("DEBUG".to_owned())
            .build();
        assert!(settings.log_gateway_notifications());
    }
}
