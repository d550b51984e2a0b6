//! End-to-end flows over the in-memory boundary implementations.

use std::sync::Arc;

use dispatch::config::DispatchConfig;
use dispatch::registry::Boundaries;
use dispatch::Dispatcher;
use domain::models::{
    CreateAssignmentRequest, CreateInstanceRequest, Device, InstanceGeometry, InstanceKind,
    InstanceTuning, MapEntity, TaskAction,
};
use domain::services::memory::{
    GridCellCoverage, InMemoryAccountPool, InMemoryDeviceDirectory, InMemoryEntityStore,
    RecordingEventSink,
};
use domain::services::{CellCoverage, DeviceDirectory, EntityStore, EventSink};
use shared::geometry::{MultiArea, Waypoint};
use uuid::Uuid;

struct Harness {
    directory: Arc<InMemoryDeviceDirectory>,
    entities: Arc<InMemoryEntityStore>,
    cells: Arc<GridCellCoverage>,
    dispatcher: Dispatcher,
}

fn harness(config: DispatchConfig) -> Harness {
    // RUST_LOG-controlled logging for debugging test runs.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let directory = Arc::new(InMemoryDeviceDirectory::new());
    let entities = Arc::new(InMemoryEntityStore::new());
    let cells = Arc::new(GridCellCoverage::new());
    let boundaries = Boundaries {
        devices: Arc::clone(&directory) as Arc<dyn DeviceDirectory>,
        accounts: Arc::new(InMemoryAccountPool::new()),
        entities: Arc::clone(&entities) as Arc<dyn EntityStore>,
        cells: Arc::clone(&cells) as Arc<dyn CellCoverage>,
        events: Arc::new(RecordingEventSink::new()) as Arc<dyn EventSink>,
    };
    Harness {
        directory,
        entities,
        cells,
        dispatcher: Dispatcher::new(config, boundaries),
    }
}

fn fence_rings() -> Vec<Vec<Waypoint>> {
    vec![vec![
        Waypoint::new(0.0, 0.0),
        Waypoint::new(0.0, 0.1),
        Waypoint::new(0.1, 0.1),
        Waypoint::new(0.1, 0.0),
    ]]
}

async fn register_device(h: &Harness, instance: &str) -> Uuid {
    let uuid = Uuid::new_v4();
    let mut device = Device::new(uuid);
    device.instance_name = Some(instance.to_string());
    h.directory.upsert(device).await;
    uuid
}

#[tokio::test]
async fn test_raid_patrol_round_trip() {
    let h = harness(DispatchConfig::default());
    h.dispatcher
        .create_instance(CreateInstanceRequest {
            name: "raid-a".to_string(),
            kind: InstanceKind::PatrolRaid,
            geometry: InstanceGeometry::Route(vec![
                Waypoint::new(1.0, 0.0),
                Waypoint::new(2.0, 0.0),
                Waypoint::new(3.0, 0.0),
            ]),
            min_level: 0,
            max_level: 40,
            tuning: InstanceTuning::default(),
        })
        .await
        .unwrap();

    let x = register_device(&h, "raid-a").await;
    let y = register_device(&h, "raid-a").await;

    // Startup poll serves the current waypoint without advancing.
    let task = h.dispatcher.get_task(x, None, true).await.unwrap();
    assert_eq!(task.action, TaskAction::ScanRaid);
    assert_eq!(task.lat, 1.0);

    // Subsequent polls interleave devices over one strictly sequential
    // shared cursor.
    let task = h.dispatcher.get_task(x, None, false).await.unwrap();
    assert_eq!(task.lat, 1.0);
    let task = h.dispatcher.get_task(y, None, false).await.unwrap();
    assert_eq!(task.lat, 2.0);
    let task = h.dispatcher.get_task(x, None, false).await.unwrap();
    assert_eq!(task.lat, 3.0);

    // Cursor wrapped; the next poll starts the next round.
    let task = h.dispatcher.get_task(y, None, false).await.unwrap();
    assert_eq!(task.lat, 1.0);
}

#[tokio::test]
async fn test_sweep_completion_rebinds_devices_through_assignment() {
    let mut config = DispatchConfig::default();
    config.max_sweep_retries = 0;
    let h = harness(config);

    // The fence is fully bootstrapped already.
    let area = MultiArea::from_rings(fence_rings()).unwrap();
    let covering = h.cells.covering_cells(15, 100_000, &area).await.unwrap();
    h.cells.mark_known(&covering).await;

    h.entities.upsert(MapEntity::new("stop-1", 0.05, 0.05, 0)).await;
    h.entities.upsert(MapEntity::new("stop-2", 0.06, 0.06, 0)).await;

    h.dispatcher
        .create_instance(CreateInstanceRequest {
            name: "quest-a".to_string(),
            kind: InstanceKind::SweepQuest,
            geometry: InstanceGeometry::Fence(fence_rings()),
            min_level: 0,
            max_level: 40,
            tuning: InstanceTuning::default(),
        })
        .await
        .unwrap();
    h.dispatcher
        .create_instance(CreateInstanceRequest {
            name: "iv-a".to_string(),
            kind: InstanceKind::PriorityIv,
            geometry: InstanceGeometry::Fence(fence_rings()),
            min_level: 25,
            max_level: 35,
            tuning: InstanceTuning {
                priority_kinds: vec![100],
                ..InstanceTuning::default()
            },
        })
        .await
        .unwrap();

    // Once quest-a finishes, every device still on it moves to iv-a.
    h.dispatcher
        .create_assignment(CreateAssignmentRequest {
            device_uuid: None,
            instance_name: "iv-a".to_string(),
            source_instance_name: Some("quest-a".to_string()),
            time: 0,
            date: None,
            enabled: true,
        })
        .await
        .unwrap();

    let device = register_device(&h, "quest-a").await;

    let task = h.dispatcher.get_task(device, None, false).await.unwrap();
    assert_eq!(task.action, TaskAction::ScanQuest);
    let task = h.dispatcher.get_task(device, None, false).await.unwrap();
    assert_eq!(task.action, TaskAction::ScanQuest);

    // Both targets handed out; exhaustion signals completion, which fires
    // the assignment and moves the device.
    assert_eq!(
        h.dispatcher.device_instance(device).await.as_deref(),
        Some("iv-a")
    );

    // The priority instance picks up streamed entities for the device.
    h.dispatcher.entity_seen(&MapEntity::new("mon-1", 0.05, 0.05, 100)).await;
    let task = h.dispatcher.get_task(device, None, false).await.unwrap();
    assert_eq!(task.action, TaskAction::ScanIv);
    assert_eq!(task.instance_name, "iv-a");
}

#[tokio::test]
async fn test_instance_removal_reruns_assignment_evaluation() {
    let h = harness(DispatchConfig::default());
    h.dispatcher
        .create_instance(CreateInstanceRequest {
            name: "raid-a".to_string(),
            kind: InstanceKind::PatrolRaid,
            geometry: InstanceGeometry::Route(vec![Waypoint::new(1.0, 0.0)]),
            min_level: 0,
            max_level: 40,
            tuning: InstanceTuning::default(),
        })
        .await
        .unwrap();
    h.dispatcher
        .create_instance(CreateInstanceRequest {
            name: "raid-b".to_string(),
            kind: InstanceKind::PatrolRaid,
            geometry: InstanceGeometry::Route(vec![Waypoint::new(2.0, 0.0)]),
            min_level: 0,
            max_level: 40,
            tuning: InstanceTuning::default(),
        })
        .await
        .unwrap();

    let device = register_device(&h, "raid-a").await;
    // Poll once so the directory binding lands in the binding table.
    h.dispatcher.get_task(device, None, true).await.unwrap();

    // A standing rule, already due today, that would place this device
    // on raid-b.
    h.dispatcher
        .create_assignment(CreateAssignmentRequest {
            device_uuid: Some(device),
            instance_name: "raid-b".to_string(),
            source_instance_name: None,
            time: 1,
            date: None,
            enabled: true,
        })
        .await
        .unwrap();

    h.dispatcher.delete_instance("raid-a").await.unwrap();
    assert_eq!(
        h.dispatcher.device_instance(device).await.as_deref(),
        Some("raid-b")
    );

    let task = h.dispatcher.get_task(device, None, false).await.unwrap();
    assert_eq!(task.lat, 2.0);
}
