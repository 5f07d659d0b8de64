use hangar_core::prelude::*;
use hangar_memory::{MemoryAvailability, MemoryJobStore, MemoryQueue, SimulatedMachines};
use hangar_scheduler::prelude::*;
use std::time::Duration;

#[tokio::test]
async fn test_machine_created_then_job_round_trip() {
    let fleet = SimulatedMachines::default();
    let services = CoreServices {
        jobs: MemoryJobStore::default(),
        queue: MemoryQueue::with_queues([queues::WAITING, queues::RUNNING]),
        machines: fleet.clone(),
        availability: MemoryAvailability::default(),
        notifier: NoNotifier,
    };
    let scheduler = JobScheduler::new(
        services,
        SchedulerConfig {
            receive_wait: Duration::ZERO,
            poll: PollPolicy::new(3, Duration::ZERO),
            ..Default::default()
        },
    );

    let machine = scheduler
        .controller()
        .create(LaunchOverrides {
            name: Some("builder".into()),
            size: Some(InstanceSize::Medium),
            ..Default::default()
        })
        .await
        .unwrap();
    let machine_id = machine.id().to_string();

    let job = scheduler
        .submit("cargo test", "s3://artifacts/ci", "builder")
        .await
        .unwrap();

    // Bootstrap has not finished yet.
    assert!(scheduler.dispatch().await.unwrap().is_empty());

    fleet.mark_initialized(&machine_id);
    let report = scheduler.dispatch().await.unwrap();
    assert_eq!(report.executed.len(), 1);
    assert_eq!(report.executed[0].id, job.id);

    let finished = scheduler.collect().await.unwrap();
    assert_eq!(finished.len(), 1);

    let job = scheduler.get(job.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Success);
    assert_eq!(job.machine_id.as_deref(), Some(machine_id.as_str()));
    assert_eq!(fleet.state(&machine_id), Some(PowerState::Stopped));
}
