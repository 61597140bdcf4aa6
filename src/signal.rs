//! Run-state signal sources: keyboard commands on stdin and OS signals.

use std::io::BufRead;

use crawlset_core::{RunStateController, Signal};
use tracing::{debug, info, warn};

/// Map one line of keyboard input to a signal.
pub(crate) fn parse_command(line: &str) -> Option<Signal> {
    // A bare space is the pause key; trim would swallow it.
    if line.trim_end_matches(['\r', '\n']) == " " {
        return Some(Signal::Toggle);
    }
    match line.trim().to_ascii_lowercase().as_str() {
        "s" | "start" => Some(Signal::Start),
        "p" | "space" | "toggle" | "pause" | "resume" => Some(Signal::Toggle),
        "q" | "stop" | "quit" => Some(Signal::Stop),
        _ => None,
    }
}

/// Forward keyboard commands from `reader` until EOF or stop.
pub(crate) fn forward_commands<R: BufRead>(reader: R, controller: &RunStateController) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read keyboard input: {}", e);
                return;
            }
        };
        match parse_command(&line) {
            Some(signal) => {
                controller.signal(signal);
            }
            None if line.trim().is_empty() => {}
            None => info!("Unknown command {:?} (s = start, p = pause/resume, q = stop)", line.trim()),
        }
        if controller.is_stopped() {
            return;
        }
    }
    debug!("Keyboard input closed");
}

/// Listen for keyboard commands on stdin.
///
/// Runs on a detached OS thread: a blocking stdin read must not hold up
/// runtime shutdown.
pub(crate) fn spawn_keyboard(controller: RunStateController) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("crawlset-keyboard".to_string())
        .spawn(move || forward_commands(std::io::stdin().lock(), &controller))?;
    Ok(())
}

/// Send Stop on SIGTERM or SIGINT.
#[cfg(unix)]
pub(crate) fn setup_os_signals(controller: &RunStateController) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let sigterm_controller = controller.clone();
    tokio::spawn(async move {
        while sigterm.recv().await.is_some() {
            info!("Received SIGTERM");
            sigterm_controller.stop();
        }
    });

    let mut sigint = signal(SignalKind::interrupt())?;
    let sigint_controller = controller.clone();
    tokio::spawn(async move {
        while sigint.recv().await.is_some() {
            info!("Received SIGINT");
            sigint_controller.stop();
        }
    });

    debug!("OS signal handlers installed (SIGTERM, SIGINT)");
    Ok(())
}

/// Send Stop on Ctrl+C.
#[cfg(not(unix))]
pub(crate) fn setup_os_signals(controller: &RunStateController) -> std::io::Result<()> {
    let controller = controller.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received Ctrl+C");
            controller.stop();
        }
    });

    debug!("OS signal handlers installed (Ctrl+C only)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlset_core::RunState;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("s"), Some(Signal::Start));
        assert_eq!(parse_command("START\n"), Some(Signal::Start));
        assert_eq!(parse_command("p"), Some(Signal::Toggle));
        assert_eq!(parse_command(" "), Some(Signal::Toggle));
        assert_eq!(parse_command("space"), Some(Signal::Toggle));
        assert_eq!(parse_command(" q "), Some(Signal::Stop));
        assert_eq!(parse_command("stop"), Some(Signal::Stop));
        assert_eq!(parse_command("x"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_forward_commands_drives_controller() {
        let controller = RunStateController::new();
        let input: &[u8] = b"s\nhello\np\n\np\nq\ns\n";

        forward_commands(input, &controller);

        assert_eq!(controller.state(), RunState::Stopped);
    }

    #[test]
    fn test_forward_commands_ends_at_eof() {
        let controller = RunStateController::new();
        let input: &[u8] = b"s\np\n";

        forward_commands(input, &controller);

        assert_eq!(controller.state(), RunState::Paused);
    }
}
