#[cfg(test)]
mod integration_tests {
    use super::super::config::SimConfig;
    use super::super::error::SimError;
    use super::super::events::{EventBroadcaster, SimEventType};
    use super::super::executor::{Completion, ExecutorKind, Outcome, RunRequest};
    use super::super::simulation::{EditOp, Simulator, SimulatorHandle};
    use tokio::time::{sleep, timeout, Duration};
    use tracing::info;

    fn handle_with_delay(delay: Duration) -> SimulatorHandle {
        SimulatorHandle::new(Simulator::new(&SimConfig {
            step_delay: delay,
            ..SimConfig::default()
        }))
    }

    /// A zero-delay run completes and leaves its report in the snapshot
    #[tokio::test]
    async fn test_driver_runs_to_completion() {
        let _ = tracing_subscriber::fmt().try_init();
        info!("🧪 Driving DFS with zero delay");

        let simulator = handle_with_delay(Duration::ZERO);
        let driver = simulator.run(RunRequest::Dfs).await.unwrap();
        let report = timeout(Duration::from_secs(5), driver)
            .await
            .expect("driver timed out")
            .unwrap()
            .expect("run was cancelled");

        match &report.outcome {
            Outcome::Success(Completion::MazePath { path, .. }) => assert_eq!(path.len(), 21),
            other => panic!("unexpected outcome {other:?}"),
        }
        let snapshot = simulator.snapshot().await;
        assert!(!snapshot.running);
        assert_eq!(snapshot.last_report, Some(report));
        assert_eq!(
            snapshot.trace.last().map(|e| e.line.as_str()),
            Some("Found path! Nodes explored: 21, Path length: 21")
        );
    }

    /// Reset during a slow run stops the driver at its next suspension point
    #[tokio::test]
    async fn test_reset_cancels_running_driver() {
        let _ = tracing_subscriber::fmt().try_init();

        let simulator = handle_with_delay(Duration::from_millis(30));
        let driver = simulator.run(RunRequest::Kruskal).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(simulator.snapshot().await.running);

        simulator.reset().await;
        let result = timeout(Duration::from_secs(2), driver)
            .await
            .expect("driver did not stop")
            .unwrap();
        assert!(result.is_none());

        let snapshot = simulator.snapshot().await;
        assert!(!snapshot.running);
        assert!(snapshot.trace.is_empty());
        assert!(snapshot.graph.edges().iter().all(|e| !e.in_tree));
    }

    /// Commands issued while a driver runs are refused without side effects
    #[tokio::test]
    async fn test_commands_rejected_while_running() {
        let simulator = handle_with_delay(Duration::from_millis(200));
        let _driver = simulator
            .run(RunRequest::Dijkstra {
                start: "A".to_string(),
                target: "F".to_string(),
            })
            .await
            .unwrap();

        let busy = simulator.run(RunRequest::Dfs).await;
        assert!(matches!(busy, Err(SimError::Busy(ExecutorKind::Dijkstra))));

        let edit = simulator
            .edit(EditOp::RemoveNode {
                id: "F".to_string(),
            })
            .await;
        assert_eq!(edit, Err(SimError::Busy(ExecutorKind::Dijkstra)));
        assert!(simulator.snapshot().await.graph.contains("F"));

        simulator.cancel().await;
        assert!(simulator
            .edit(EditOp::RemoveNode {
                id: "F".to_string()
            })
            .await
            .is_ok());
    }

    /// A faster speed takes effect from the next suspension point
    #[tokio::test]
    async fn test_speed_change_applies_to_running_driver() {
        let simulator = handle_with_delay(Duration::from_millis(200));
        let driver = simulator.run(RunRequest::Kruskal).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        let early = simulator.snapshot().await;
        assert!(early.running);
        assert!(early.trace.len() <= 2);

        // At 200 ms per step the remaining steps would take several seconds
        simulator.set_speed(Duration::from_millis(1)).await;
        let report = timeout(Duration::from_millis(1500), driver)
            .await
            .expect("speed change was not picked up")
            .unwrap()
            .expect("run was cancelled");
        assert!(report.outcome.is_success());
        assert_eq!(simulator.snapshot().await.delay_ms, 1);
    }

    /// A new run after reset supersedes the old driver
    #[tokio::test]
    async fn test_new_run_supersedes_cancelled_driver() {
        let simulator = handle_with_delay(Duration::from_millis(50));
        let first = simulator.run(RunRequest::Kruskal).await.unwrap();
        sleep(Duration::from_millis(20)).await;
        simulator.reset().await;
        simulator.set_speed(Duration::ZERO).await;

        let second = simulator
            .run(RunRequest::Pbft {
                request: "Transaction-X".to_string(),
            })
            .await
            .unwrap();

        let (first, second) = tokio::join!(first, second);
        assert!(first.unwrap().is_none());
        let report = second.unwrap().expect("second run was cancelled");
        assert_eq!(report.executor, ExecutorKind::Pbft);
        assert!(report.outcome.is_success());
    }

    /// Observers see the same trace lines the snapshot holds, in order
    #[tokio::test]
    async fn test_events_mirror_trace() {
        let _ = tracing_subscriber::fmt().try_init();

        let (events, mut receiver) = EventBroadcaster::new(4096);
        let simulator = SimulatorHandle::new(
            Simulator::new(&SimConfig {
                step_delay: Duration::ZERO,
                ..SimConfig::default()
            })
            .with_events(events),
        );
        simulator
            .edit(EditOp::SetPaxosFaulty { id: 3, faulty: true })
            .await
            .unwrap();
        let driver = simulator
            .run(RunRequest::Paxos {
                round: None,
                value: "Value-A".to_string(),
            })
            .await
            .unwrap();
        timeout(Duration::from_secs(5), driver).await.unwrap().unwrap();

        let mut streamed = Vec::new();
        let mut finished = None;
        while let Ok(event) = receiver.try_recv() {
            match event.event_type {
                SimEventType::TraceAppended { entries } => streamed.extend(entries),
                SimEventType::RunFinished { report } => finished = Some(report),
                _ => {}
            }
        }

        let snapshot = simulator.snapshot().await;
        assert_eq!(streamed, snapshot.trace);
        let report = finished.expect("no RunFinished event");
        assert_eq!(report.faults.map(|f| (f.faulty, f.tolerated)), Some((vec![3], true)));
    }
}
