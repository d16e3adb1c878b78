//! Daemon module for the site limiter.
//!
//! This module contains the background coordinator and its plumbing:
//! - `coordinator`: event handling, policy flow, and the message API
//! - `timer`: per-tab timer lifecycle management
//! - `ipc`: Unix-socket server carrying the message API

pub mod coordinator;
pub mod ipc;
pub mod timer;

pub use coordinator::{Coordinator, TabInfo};
pub use ipc::{IpcServer, RequestHandler, SOCKET_FILE_NAME};
pub use timer::{ShellCommand, TimerManager, TimerStatus};

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex};

use crate::scheduler::TokioAlarmScheduler;
use crate::storage::{data_dir, Repository};

/// Runs the daemon until interrupted.
///
/// Events are processed one at a time: incoming IPC connections, fired
/// alarms, and shell commands are multiplexed onto the single coordinator.
pub async fn run() -> Result<()> {
    let repo = Repository::open_default().context("ストレージを開けませんでした")?;
    repo.initialize()
        .context("ストレージの初期化に失敗しました")?;

    let (alarm_tx, mut alarm_rx) = mpsc::unbounded_channel();
    let (shell_tx, mut shell_rx) = mpsc::unbounded_channel();

    let scheduler = Arc::new(TokioAlarmScheduler::new(alarm_tx));
    let coordinator = Arc::new(Mutex::new(Coordinator::new(repo, scheduler, shell_tx)));
    let handler = RequestHandler::new(Arc::clone(&coordinator));

    let socket_path = data_dir()
        .context("ストレージディレクトリが特定できません")?
        .join(SOCKET_FILE_NAME);
    let server = IpcServer::new(&socket_path)?;
    tracing::info!("daemon listening on {:?}", server.socket_path());

    loop {
        tokio::select! {
            connection = server.accept() => {
                match connection {
                    Ok(mut stream) => {
                        if let Err(e) = serve_connection(&handler, &mut stream).await {
                            tracing::warn!("connection handling failed: {:#}", e);
                        }
                    }
                    Err(e) => tracing::warn!("accept failed: {:#}", e),
                }
            }
            Some(name) = alarm_rx.recv() => {
                coordinator.lock().await.on_alarm(&name);
            }
            Some(command) = shell_rx.recv() => {
                deliver_shell_command(&command);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Serves a single request/response exchange on an accepted connection.
async fn serve_connection(
    handler: &RequestHandler,
    stream: &mut tokio::net::UnixStream,
) -> Result<()> {
    let request = IpcServer::receive_request(stream).await?;
    let response = handler.handle(request).await;
    IpcServer::send_response(stream, &response).await
}

/// Hands a shell command to the surrounding shell.
///
/// The browser-side shell owns tab navigation and badge rendering; from the
/// daemon's side delivery is the log line the shell's observer tails.
fn deliver_shell_command(command: &ShellCommand) {
    match command {
        ShellCommand::RedirectTab { tab_id, url } => {
            tracing::info!(target: "shell", "redirect tab {} -> {}", tab_id, url);
        }
        ShellCommand::SetBadge { count } => {
            tracing::info!(target: "shell", "badge count {}", count);
        }
    }
}
