use crate::app::{args::Args, cli_input, commands::Command, settings::Settings};
use crate::faxdesk::audio::AudioSystem;
use crate::faxdesk::backend::{BackendClient, SendFaxRequest};
use crate::faxdesk::fax::{self, MediaArg};
use crate::faxdesk::gateway::GatewayConnector;
use crate::faxdesk::session::{SessionController, SessionEvent};

use std::sync::Arc;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc;

pub fn run_app(args: Args) -> Result<()> {
    env_logger::init();
    log::info!("Initializing the application");

    let settings = Settings::from_args(args);
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_io()
        .enable_time()
        .build()?;
    rt.block_on(run_app_inner(settings))?;

    Ok(())
}

async fn run_app_inner(settings: Settings) -> Result<()> {
    let command_receiver = cli_input::run_input_system();

    log::info!("Running the application");
    let mut app = App::build(settings)?;
    app.run(command_receiver).await
}

pub(crate) struct App {
    settings: Settings,
    backend: BackendClient,
    session: SessionController,
}

impl App {
    pub(super) fn build(settings: Settings) -> Result<Self> {
        let backend = BackendClient::new(settings.backend_url.clone());
        let connector = Arc::new(GatewayConnector::new(
            settings.rtc_url.clone(),
            settings.log_gateway_notifications(),
        ));
        let audio = AudioSystem::build()?;
        let mut session = SessionController::new(backend.clone(), connector, Box::new(audio));
        session.connect();
        Ok(Self {
            settings,
            backend,
            session,
        })
    }

    pub(super) async fn run(
        &mut self,
        mut command_receiver: mpsc::Receiver<Command>,
    ) -> Result<()> {
        loop {
            select! {
                command = command_receiver.recv() => match command {
                    Some(command) => self.execute_command(command).await,
                    None => break,
                },
                event = self.session.run() => if let Some(event) = event {
                    self.handle_session_event(event);
                },
            }
        }

        self.session.disconnect().await;
        Ok(())
    }

    async fn execute_command(&mut self, command: Command) {
        log::info!(command:%; "Executing the command.");
        let _ = command
            .execute(self)
            .await
            .inspect_err(|err| log::warn!(err:%; "Command execution."));
    }

    fn handle_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => println!("{}", self.session.status_line()),
            SessionEvent::ConnectionFailed(message) => println!("Connection error: {message}"),
            SessionEvent::ConnectionClosed => println!("Disconnected"),
            SessionEvent::IncomingCall { caller } => {
                println!("Incoming call from {caller} (try: answer | reject)")
            }
            SessionEvent::CallActive => println!("Connected"),
            SessionEvent::CallEnded => println!("Call ended. {}", self.session.status_line()),
        }
    }

    pub(crate) async fn place_call(&mut self, destination: &str) -> Result<()> {
        log::info!(destination:%; "Placing a call.");
        self.session.place_call(destination).await?;
        println!("{}", self.session.status_line());
        Ok(())
    }

    pub(crate) async fn answer(&mut self) -> Result<()> {
        log::info!("Answering the incoming call.");
        self.session.answer().await?;
        println!("{}", self.session.status_line());
        Ok(())
    }

    pub(crate) async fn reject(&mut self) -> Result<()> {
        log::info!("Rejecting the incoming call.");
        self.session.reject().await
    }

    pub(crate) async fn hang_up(&mut self) -> Result<()> {
        log::info!("Hanging up.");
        self.session.hang_up().await
    }

    pub(crate) async fn set_muted(&mut self, muted: bool) -> Result<()> {
        log::info!(muted:%; "Changing the mute flag.");
        self.session.set_muted(muted).await
    }

    pub(crate) async fn send_dtmf(&mut self, digit: char) -> Result<()> {
        log::info!(digit:%; "Sending a touch-tone digit.");
        self.session.send_dtmf(digit).await
    }

    pub(crate) fn print_status(&self) {
        println!("{}", self.session.status_line());
        if let Some(call) = self.session.calls().active() {
            println!(
                "Active call: {} ({}){}",
                call.remote,
                call.id,
                if call.muted { " [muted]" } else { "" },
            );
        }
        if let Some(call) = self.session.calls().incoming() {
            println!("Incoming call: {} ({})", call.remote, call.id);
        }
    }

    pub(crate) async fn send_fax(&mut self, to: &str, media: MediaArg) -> Result<()> {
        log::info!(to:%; "Sending a fax.");
        let media_url = fax::media_reference(&media)?;
        let request = SendFaxRequest::builder()
            .to(to)
            .media_url(media_url)
            .from(self.settings.caller_number.clone())
            .build();
        let fax_id = self.backend.send_fax(&request).await?;
        println!("Fax queued: {fax_id}");
        Ok(())
    }

    pub(crate) async fn fax_status(&mut self, id: &str) -> Result<()> {
        let record = self.backend.fax_status(id).await?;
        println!("{}", fax::render_status_line(&record));
        Ok(())
    }

    pub(crate) async fn fax_list(&mut self) -> Result<()> {
        let faxes = self.backend.list_faxes().await?;
        print!("{}", fax::render_list(&faxes));
        Ok(())
    }

    pub(crate) async fn fax_show(&mut self, id: &str) -> Result<()> {
        let record = self.backend.fax_status(id).await?;
        print!("{}", fax::render_detail(&fax::FaxDetails::from_value(&record)));
        Ok(())
    }
}
