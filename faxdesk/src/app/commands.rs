use crate::app::application::App;

use std::fmt::Display;

use anyhow::Result;

pub enum Command {
    PlaceCall(commands::PlaceCall),
    Answer(commands::Answer),
    Reject(commands::Reject),
    HangUp(commands::HangUp),
    Mute(commands::Mute),
    Unmute(commands::Unmute),
    Dtmf(commands::Dtmf),
    Status(commands::Status),
    FaxSend(commands::FaxSend),
    FaxStatus(commands::FaxStatus),
    FaxList(commands::FaxList),
    FaxShow(commands::FaxShow),
}

impl Command {
    pub async fn execute(self, app: &mut App) -> Result<()> {
        match self {
            Command::PlaceCall(cmd) => cmd.execute(app).await,
            Command::Answer(cmd) => cmd.execute(app).await,
            Command::Reject(cmd) => cmd.execute(app).await,
            Command::HangUp(cmd) => cmd.execute(app).await,
            Command::Mute(cmd) => cmd.execute(app).await,
            Command::Unmute(cmd) => cmd.execute(app).await,
            Command::Dtmf(cmd) => cmd.execute(app).await,
            Command::Status(cmd) => cmd.execute(app).await,
            Command::FaxSend(cmd) => cmd.execute(app).await,
            Command::FaxStatus(cmd) => cmd.execute(app).await,
            Command::FaxList(cmd) => cmd.execute(app).await,
            Command::FaxShow(cmd) => cmd.execute(app).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Command::PlaceCall(_) => "call",
            Command::Answer(_) => "answer",
            Command::Reject(_) => "reject",
            Command::HangUp(_) => "hangup",
            Command::Mute(_) => "mute",
            Command::Unmute(_) => "unmute",
            Command::Dtmf(_) => "dtmf",
            Command::Status(_) => "status",
            Command::FaxSend(_) => "fax-send",
            Command::FaxStatus(_) => "fax-status",
            Command::FaxList(_) => "fax-list",
            Command::FaxShow(_) => "fax-show",
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) mod commands {
    use super::Command;
    use crate::app::application::App;
    use crate::faxdesk::fax::MediaArg;

    use anyhow::Result;

    pub struct PlaceCall {
        destination: String,
    }

    impl PlaceCall {
        pub fn new(destination: &str) -> Self {
            Self {
                destination: destination.to_owned(),
            }
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.place_call(&self.destination).await
        }
    }

    impl From<PlaceCall> for Command {
        fn from(value: PlaceCall) -> Self {
            Command::PlaceCall(value)
        }
    }

    pub struct Answer;

    impl Answer {
        pub fn new() -> Self {
            Self {}
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.answer().await
        }
    }

    impl From<Answer> for Command {
        fn from(value: Answer) -> Self {
            Command::Answer(value)
        }
    }

    pub struct Reject;

    impl Reject {
        pub fn new() -> Self {
            Self {}
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.reject().await
        }
    }

    impl From<Reject> for Command {
        fn from(value: Reject) -> Self {
            Command::Reject(value)
        }
    }

    pub struct HangUp;

    impl HangUp {
        pub fn new() -> Self {
            Self {}
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.hang_up().await
        }
    }

    impl From<HangUp> for Command {
        fn from(value: HangUp) -> Self {
            Command::HangUp(value)
        }
    }

    pub struct Mute;

    impl Mute {
        pub fn new() -> Self {
            Self {}
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.set_muted(true).await
        }
    }

    impl From<Mute> for Command {
        fn from(value: Mute) -> Self {
            Command::Mute(value)
        }
    }

    pub struct Unmute;

    impl Unmute {
        pub fn new() -> Self {
            Self {}
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.set_muted(false).await
        }
    }

    impl From<Unmute> for Command {
        fn from(value: Unmute) -> Self {
            Command::Unmute(value)
        }
    }

    pub struct Dtmf {
        digit: char,
    }

    impl Dtmf {
        pub fn new(digit: char) -> Self {
            Self { digit }
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.send_dtmf(self.digit).await
        }
    }

    impl From<Dtmf> for Command {
        fn from(value: Dtmf) -> Self {
            Command::Dtmf(value)
        }
    }

    pub struct Status;

    impl Status {
        pub fn new() -> Self {
            Self {}
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.print_status();
            Ok(())
        }
    }

    impl From<Status> for Command {
        fn from(value: Status) -> Self {
            Command::Status(value)
        }
    }

    pub struct FaxSend {
        to: String,
        media: MediaArg,
    }

    impl FaxSend {
        pub fn new(to: &str, media: MediaArg) -> Self {
            Self {
                to: to.to_owned(),
                media,
            }
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.send_fax(&self.to, self.media).await
        }
    }

    impl From<FaxSend> for Command {
        fn from(value: FaxSend) -> Self {
            Command::FaxSend(value)
        }
    }

    pub struct FaxStatus {
        id: String,
    }

    impl FaxStatus {
        pub fn new(id: &str) -> Self {
            Self { id: id.to_owned() }
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.fax_status(&self.id).await
        }
    }

    impl From<FaxStatus> for Command {
        fn from(value: FaxStatus) -> Self {
            Command::FaxStatus(value)
        }
    }

    pub struct FaxList;

    impl FaxList {
        pub fn new() -> Self {
            Self {}
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.fax_list().await
        }
    }

    impl From<FaxList> for Command {
        fn from(value: FaxList) -> Self {
            Command::FaxList(value)
        }
    }

    pub struct FaxShow {
        id: String,
    }

    impl FaxShow {
        pub fn new(id: &str) -> Self {
            Self { id: id.to_owned() }
        }

        pub async fn execute(self, app: &mut App) -> Result<()> {
            app.fax_show(&self.id).await
        }
    }

    impl From<FaxShow> for Command {
        fn from(value: FaxShow) -> Self {
            Command::FaxShow(value)
        }
    }
}
