use std::{thread, time::Duration};

use crate::app::commands::Command;

use anyhow::Result;
use tokio::sync::mpsc;

pub(crate) fn run_input_system() -> mpsc::Receiver<Command> {
    let (command_sender, command_receiver) = mpsc::channel(20);
    thread::spawn(|| run_input_system_inner(command_sender));
    command_receiver
}

fn run_input_system_inner(command_sender: mpsc::Sender<Command>) {
    let mut input_system = CliInputSystem::new(command_sender);
    if let Err(err) = input_system.run() {
        log::error!(err:%; "CLI input system err.");
    }
}

struct CliInputSystem {
    command_sender: mpsc::Sender<Command>,
    parsers: Vec<CommandParser>,
}

impl CliInputSystem {
    pub fn new(command_sender: mpsc::Sender<Command>) -> Self {
        let parsers = vec![
            parsers::PlaceCall::new().into(),
            parsers::Dtmf::new().into(),
            parsers::FaxSend::new().into(),
            parsers::FaxStatus::new().into(),
            parsers::FaxShow::new().into(),
            parsers::Bare::answer().into(),
            parsers::Bare::reject().into(),
            parsers::Bare::hang_up().into(),
            parsers::Bare::mute().into(),
            parsers::Bare::unmute().into(),
            parsers::Bare::status().into(),
            parsers::Bare::fax_list().into(),
        ];
        Self {
            command_sender,
            parsers,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        log::info!("Running the CLI input system");
        loop {
            let Some(line) = misc::read_stdin_line() else {
                // stdin is gone; closing the channel stops the app loop.
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with("help") {
                self.print_help();
                continue;
            }
            if let Some(command) = self.parse_command(&line) {
                self.send_command(command);
            }

            thread::sleep(Duration::from_millis(100));
        }
    }

    fn send_command(&mut self, command: Command) {
        let result = self.command_sender.blocking_send(command);
        match result {
            Ok(_) => (),
            Err(err) => {
                log::error!(err:%; "CLI input system err.");
            }
        }
    }

    fn print_help(&self) {
        println!("==== Help ====");
        for parser in &self.parsers {
            println!("\t {}", parser.get_help());
        }
    }

    fn parse_command(&self, line: &str) -> Option<Command> {
        // skip CommandParserError::Command error, try to find a parser for a command with a specified name
        let result = self.parsers.iter().find_map(|parser| {
            let result = parser.parse(line);
            if result.is_ok()
                || result
                    .as_ref()
                    .is_err_and(|err| matches!(err, CommandParserError::Arguments(_)))
            {
                Some(result)
            } else {
                None
            }
        });

        match result {
            Some(result) => result
                .inspect_err(|err| {
                    log::warn!("CLI input system parser err: {err:?}");
                })
                .ok(),
            None => {
                log::warn!("Unknown command");
                None
            }
        }
    }
}

#[derive(Debug)]
enum CommandParserError {
    Command,
    Arguments(String),
}

enum CommandParser {
    PlaceCall(parsers::PlaceCall),
    Dtmf(parsers::Dtmf),
    FaxSend(parsers::FaxSend),
    FaxStatus(parsers::FaxStatus),
    FaxShow(parsers::FaxShow),
    Bare(parsers::Bare),
}

impl CommandParser {
    fn parse(&self, line: &str) -> Result<Command, CommandParserError> {
        match self {
            CommandParser::PlaceCall(parser) => parser.parse(line),
            CommandParser::Dtmf(parser) => parser.parse(line),
            CommandParser::FaxSend(parser) => parser.parse(line),
            CommandParser::FaxStatus(parser) => parser.parse(line),
            CommandParser::FaxShow(parser) => parser.parse(line),
            CommandParser::Bare(parser) => parser.parse(line),
        }
    }

    fn get_help(&self) -> &str {
        match self {
            CommandParser::PlaceCall(parser) => parser.get_help(),
            CommandParser::Dtmf(parser) => parser.get_help(),
            CommandParser::FaxSend(parser) => parser.get_help(),
            CommandParser::FaxStatus(parser) => parser.get_help(),
            CommandParser::FaxShow(parser) => parser.get_help(),
            CommandParser::Bare(parser) => parser.get_help(),
        }
    }
}

mod parsers {
    use super::{CommandParser, CommandParserError};
    use crate::app::commands::{commands, Command};
    use crate::faxdesk::fax::MediaArg;

    use std::collections::HashMap;

    use anyhow::Result;

    struct Parser {
        fields: Vec<String>,
    }

    impl Parser {
        fn new<I: IntoIterator<Item = String>>(fields: I) -> Self {
            let fields = fields.into_iter().collect();
            Self { fields }
        }

        fn parse(&self, line: &str) -> Result<HashMap<String, String>> {
            let tokens = line.split(' ');
            let mut data = HashMap::new();

            for token in tokens.filter(|token| !token.is_empty()) {
                let (name, value) = self.parse_field(token)?;
                if self.fields.contains(&name.into()) {
                    let _ = data.insert(name.into(), value.to_owned());
                } else {
                    return Err(anyhow::Error::msg(format!("Unknown field: {name}")));
                }
            }

            Ok(data)
        }

        fn parse_field<'a>(&self, token: &'a str) -> Result<(&'a str, &'a str)> {
            let mut field = token.splitn(2, '=');
            let name = field
                .next()
                .ok_or(anyhow::Error::msg("Field name is missing"))?;
            let value = field
                .next()
                .ok_or(anyhow::Error::msg("Field value is missing"))?;
            Ok((name, value))
        }
    }

    pub struct PlaceCall {
        parser: Parser,
    }

    impl PlaceCall {
        pub fn new() -> Self {
            let parser = Parser::new(["to".into()]);
            Self { parser }
        }

        pub fn parse(&self, line: &str) -> Result<Command, CommandParserError> {
            if !line.starts_with("call") {
                Err(CommandParserError::Command)
            } else {
                let data = self
                    .parser
                    .parse(line.trim_start_matches("call"))
                    .map_err(|err| CommandParserError::Arguments(err.to_string()))?;

                let destination = data.get("to").ok_or(CommandParserError::Arguments(
                    "\"to\" field is missing".to_owned(),
                ))?;

                let command = commands::PlaceCall::new(destination);

                Ok(command.into())
            }
        }

        pub fn get_help(&self) -> &str {
            "call to=<phone_number>"
        }
    }

    impl From<PlaceCall> for CommandParser {
        fn from(value: PlaceCall) -> Self {
            CommandParser::PlaceCall(value)
        }
    }

    pub struct Dtmf {
        parser: Parser,
    }

    impl Dtmf {
        pub fn new() -> Self {
            let parser = Parser::new(["digit".into()]);
            Self { parser }
        }

        pub fn parse(&self, line: &str) -> Result<Command, CommandParserError> {
            if !line.starts_with("dtmf") {
                Err(CommandParserError::Command)
            } else {
                let data = self
                    .parser
                    .parse(line.trim_start_matches("dtmf"))
                    .map_err(|err| CommandParserError::Arguments(err.to_string()))?;

                let digit = data.get("digit").ok_or(CommandParserError::Arguments(
                    "\"digit\" field is missing".to_owned(),
                ))?;
                let mut chars = digit.chars();
                let digit = match (chars.next(), chars.next()) {
                    (Some(digit), None) => digit,
                    _ => {
                        return Err(CommandParserError::Arguments(
                            "\"digit\" must be a single keypad character".to_owned(),
                        ))
                    }
                };

                let command = commands::Dtmf::new(digit);

                Ok(command.into())
            }
        }

        pub fn get_help(&self) -> &str {
            "dtmf digit=<0-9, *, #, A-D>"
        }
    }

    impl From<Dtmf> for CommandParser {
        fn from(value: Dtmf) -> Self {
            CommandParser::Dtmf(value)
        }
    }

    pub struct FaxSend {
        parser: Parser,
    }

    impl FaxSend {
        pub fn new() -> Self {
            let parser = Parser::new(["to".into(), "media".into(), "file".into()]);
            Self { parser }
        }

        pub fn parse(&self, line: &str) -> Result<Command, CommandParserError> {
            if !line.starts_with("fax-send") {
                Err(CommandParserError::Command)
            } else {
                let data = self
                    .parser
                    .parse(line.trim_start_matches("fax-send"))
                    .map_err(|err| CommandParserError::Arguments(err.to_string()))?;

                let to = data.get("to").ok_or(CommandParserError::Arguments(
                    "\"to\" field is missing".to_owned(),
                ))?;
                let media = match (data.get("media"), data.get("file")) {
                    (Some(url), None) => MediaArg::Url(url.clone()),
                    (None, Some(path)) => MediaArg::File(path.clone()),
                    _ => {
                        return Err(CommandParserError::Arguments(
                            "exactly one of \"media\" or \"file\" is required".to_owned(),
                        ))
                    }
                };

                let command = commands::FaxSend::new(to, media);

                Ok(command.into())
            }
        }

        pub fn get_help(&self) -> &str {
            "fax-send to=<phone_number> media=<document_url> | file=<local_path>"
        }
    }

    impl From<FaxSend> for CommandParser {
        fn from(value: FaxSend) -> Self {
            CommandParser::FaxSend(value)
        }
    }

    pub struct FaxStatus {
        parser: Parser,
    }

    impl FaxStatus {
        pub fn new() -> Self {
            let parser = Parser::new(["id".into()]);
            Self { parser }
        }

        pub fn parse(&self, line: &str) -> Result<Command, CommandParserError> {
            if !line.starts_with("fax-status") {
                Err(CommandParserError::Command)
            } else {
                let data = self
                    .parser
                    .parse(line.trim_start_matches("fax-status"))
                    .map_err(|err| CommandParserError::Arguments(err.to_string()))?;

                let id = data.get("id").ok_or(CommandParserError::Arguments(
                    "\"id\" field is missing".to_owned(),
                ))?;

                let command = commands::FaxStatus::new(id);

                Ok(command.into())
            }
        }

        pub fn get_help(&self) -> &str {
            "fax-status id=<fax_id>"
        }
    }

    impl From<FaxStatus> for CommandParser {
        fn from(value: FaxStatus) -> Self {
            CommandParser::FaxStatus(value)
        }
    }

    pub struct FaxShow {
        parser: Parser,
    }

    impl FaxShow {
        pub fn new() -> Self {
            let parser = Parser::new(["id".into()]);
            Self { parser }
        }

        pub fn parse(&self, line: &str) -> Result<Command, CommandParserError> {
            if !line.starts_with("fax-show") {
                Err(CommandParserError::Command)
            } else {
                let data = self
                    .parser
                    .parse(line.trim_start_matches("fax-show"))
                    .map_err(|err| CommandParserError::Arguments(err.to_string()))?;

                let id = data.get("id").ok_or(CommandParserError::Arguments(
                    "\"id\" field is missing".to_owned(),
                ))?;

                let command = commands::FaxShow::new(id);

                Ok(command.into())
            }
        }

        pub fn get_help(&self) -> &str {
            "fax-show id=<fax_id>"
        }
    }

    impl From<FaxShow> for CommandParser {
        fn from(value: FaxShow) -> Self {
            CommandParser::FaxShow(value)
        }
    }

    /// The argument-less commands share one parser shape.
    pub struct Bare {
        keyword: &'static str,
        help: &'static str,
        build: fn() -> Command,
    }

    impl Bare {
        pub fn answer() -> Self {
            Self {
                keyword: "answer",
                help: "answer",
                build: || commands::Answer::new().into(),
            }
        }

        pub fn reject() -> Self {
            Self {
                keyword: "reject",
                help: "reject",
                build: || commands::Reject::new().into(),
            }
        }

        pub fn hang_up() -> Self {
            Self {
                keyword: "hangup",
                help: "hangup",
                build: || commands::HangUp::new().into(),
            }
        }

        pub fn mute() -> Self {
            Self {
                keyword: "mute",
                help: "mute",
                build: || commands::Mute::new().into(),
            }
        }

        pub fn unmute() -> Self {
            Self {
                keyword: "unmute",
                help: "unmute",
                build: || commands::Unmute::new().into(),
            }
        }

        pub fn status() -> Self {
            Self {
                keyword: "status",
                help: "status",
                build: || commands::Status::new().into(),
            }
        }

        pub fn fax_list() -> Self {
            Self {
                keyword: "fax-list",
                help: "fax-list",
                build: || commands::FaxList::new().into(),
            }
        }

        pub fn parse(&self, line: &str) -> Result<Command, CommandParserError> {
            if line.trim() == self.keyword {
                Ok((self.build)())
            } else {
                Err(CommandParserError::Command)
            }
        }

        pub fn get_help(&self) -> &str {
            self.help
        }
    }

    impl From<Bare> for CommandParser {
        fn from(value: Bare) -> Self {
            CommandParser::Bare(value)
        }
    }
}

mod misc {
    pub fn read_stdin_line() -> Option<String> {
        let mut buf = String::new();
        let read = std::io::stdin()
            .read_line(&mut buf)
            .inspect_err(|err| {
                log::warn!(err:%; "CLI input system err.");
            })
            .ok()?;
        if read == 0 {
            return None;
        }
        trim_newline(&mut buf);
        Some(buf)
    }

    fn trim_newline(s: &mut String) {
        if s.ends_with('\n') {
            s.pop();
            if s.ends_with('\r') {
                s.pop();
            }
        }
    }
}
