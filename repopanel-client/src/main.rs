use std::{io::Write, path::PathBuf};

use clap::Parser;
use repopanel_client::{
    clipboard::Clipboard,
    command::{self, HELP},
    logging::init_logging,
    panel_state::default_state_path,
    render::render_text,
    session::{Flow, Session},
    transport::{Transport, connect, on_receive, run_bridge},
};
use repopanel_core::Message;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "repopanel")]
struct PanelArgs {
    #[arg(long, default_value = "ws://127.0.0.1:8787/ws")]
    server_url: String,
    /// Where the selected tab is remembered between runs.
    #[arg(long)]
    state_file: Option<PathBuf>,
    /// Show the Search tab.
    #[arg(long)]
    search: bool,
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = PanelArgs::parse();
    init_logging(args.log_file.as_deref());

    let state_path = args.state_file.clone().unwrap_or_else(default_state_path);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<Message>();

    let transport = match Transport::new(outbound_tx, state_path) {
        Ok(transport) => transport,
        Err(err) => {
            error!("transport setup failed: {err}");
            std::process::exit(1);
        }
    };
    let mut session = Session::new(transport, Clipboard::default(), args.search);
    redraw(&mut session);

    let stream = match connect(&args.server_url).await {
        Ok(stream) => stream,
        Err(err) => {
            error!(server_url = %args.server_url, "{err}");
            std::process::exit(1);
        }
    };
    let mut bridge = tokio::spawn(run_bridge(stream, outbound_rx, inbound_tx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            received = on_receive(&mut inbound_rx, |message| session.handle_inbound(message)) => {
                if !received {
                    info!("host connection closed");
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match command::parse(&line) {
                    Ok(command) => match session.handle_command(command) {
                        Flow::Continue => {}
                        Flow::Help => println!("{HELP}"),
                        Flow::Quit => break,
                    },
                    Err(err) => println!("{err}"),
                },
                Ok(None) => break,
                Err(err) => {
                    error!("stdin read failed: {err}");
                    break;
                }
            },
            _ = &mut bridge => {
                info!("transport stopped");
                break;
            }
        }
        redraw(&mut session);
    }

    bridge.abort();
}

fn redraw(session: &mut Session) {
    if !session.take_dirty() {
        return;
    }
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "\n{}", render_text(&session.view()));
    let _ = stdout.flush();
}
