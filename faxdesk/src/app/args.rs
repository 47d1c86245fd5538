use clap::{self, Parser};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long, env = "FAXDESK_BACKEND_URL", help = "Backend service base URL")]
    pub backend_url: String,
    #[arg(long, env = "FAXDESK_RTC_URL", help = "Real-time gateway base URL")]
    pub rtc_url: String,
    #[arg(
        long,
        env = "FAXDESK_CALLER_NUMBER",
        help = "Default caller number for outbound faxes"
    )]
    pub caller_number: Option<String>,
    #[arg(
        long,
        env = "FAXDESK_RTC_LOG",
        default_value = "warn",
        help = "Gateway notification log level (warn|debug)"
    )]
    pub rtc_log: String,
}
