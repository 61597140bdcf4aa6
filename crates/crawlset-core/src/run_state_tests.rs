use super::*;

#[test]
fn test_state_display() {
    assert_eq!(RunState::Idle.to_string(), "IDLE");
    assert_eq!(RunState::Running.to_string(), "RUNNING");
    assert_eq!(RunState::Paused.to_string(), "PAUSED");
    assert_eq!(RunState::Stopped.to_string(), "STOPPED");
}

#[test]
fn test_transitions() {
    assert_eq!(RunState::Idle.apply(Signal::Start), RunState::Running);
    assert_eq!(RunState::Idle.apply(Signal::Toggle), RunState::Idle);
    assert_eq!(RunState::Idle.apply(Signal::Stop), RunState::Stopped);
    assert_eq!(RunState::Running.apply(Signal::Start), RunState::Running);
    assert_eq!(RunState::Running.apply(Signal::Toggle), RunState::Paused);
    assert_eq!(RunState::Paused.apply(Signal::Toggle), RunState::Running);
    assert_eq!(RunState::Paused.apply(Signal::Start), RunState::Paused);
    assert_eq!(RunState::Paused.apply(Signal::Stop), RunState::Stopped);
}

#[test]
fn test_stopped_is_terminal() {
    for signal in [Signal::Start, Signal::Toggle, Signal::Stop] {
        assert_eq!(RunState::Stopped.apply(signal), RunState::Stopped);
    }
}

#[test]
fn test_controller_starts_idle() {
    let controller = RunStateController::new();
    assert_eq!(controller.state(), RunState::Idle);
    assert!(!controller.is_stopped());
}

#[test]
fn test_controller_signals() {
    let controller = RunStateController::new();
    assert_eq!(controller.start(), RunState::Running);
    assert_eq!(controller.toggle(), RunState::Paused);
    assert_eq!(controller.toggle(), RunState::Running);
    assert_eq!(controller.stop(), RunState::Stopped);
    assert_eq!(controller.start(), RunState::Stopped);
}

#[test]
fn test_stop_cancels_token() {
    let controller = RunStateController::new();
    let token = controller.cancellation_token();
    assert!(!token.is_cancelled());

    controller.stop();
    assert!(token.is_cancelled());
}

#[test]
fn test_clones_share_state() {
    let controller = RunStateController::new();
    let keyboard = controller.clone();

    keyboard.start();
    assert_eq!(controller.state(), RunState::Running);
}

#[tokio::test]
async fn test_checkpoint_running_continues() {
    let controller = RunStateController::new();
    controller.start();

    let mut gate = controller.gate();
    assert_eq!(gate.checkpoint().await, Flow::Continue);
}

#[tokio::test]
async fn test_checkpoint_stopped() {
    let controller = RunStateController::new();
    controller.stop();

    let mut gate = controller.gate();
    assert!(gate.checkpoint().await.is_stop());
}

#[tokio::test(start_paused = true)]
async fn test_checkpoint_blocks_while_idle() {
    let controller = RunStateController::new();
    let mut gate = controller.gate();

    let waiter = tokio::spawn(async move { gate.checkpoint().await });
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!waiter.is_finished());

    controller.start();
    assert_eq!(waiter.await.unwrap(), Flow::Continue);
}

#[tokio::test(start_paused = true)]
async fn test_checkpoint_blocks_while_paused_until_toggle() {
    let controller = RunStateController::new();
    controller.start();
    controller.toggle();
    let mut gate = controller.gate();

    let waiter = tokio::spawn(async move { gate.checkpoint().await });
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!waiter.is_finished());

    controller.toggle();
    assert_eq!(waiter.await.unwrap(), Flow::Continue);
}

#[tokio::test(start_paused = true)]
async fn test_stop_releases_paused_checkpoint() {
    let controller = RunStateController::new();
    controller.start();
    controller.toggle();
    let mut gate = controller.gate();

    let waiter = tokio::spawn(async move { gate.checkpoint().await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    controller.stop();
    assert_eq!(waiter.await.unwrap(), Flow::Stop);
}

#[tokio::test(start_paused = true)]
async fn test_gate_sleep_interrupted_by_stop() {
    let controller = RunStateController::new();
    controller.start();
    let gate = controller.gate();

    let stopper = controller.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.stop();
    });

    let started = tokio::time::Instant::now();
    assert!(!gate.sleep(Duration::from_secs(60)).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(gate.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn test_gate_sleep_completes() {
    let controller = RunStateController::new();
    controller.start();
    let gate = controller.gate();

    assert!(gate.sleep(Duration::from_millis(800)).await);
}
