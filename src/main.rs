use anyhow::Result;
use tracing::info;

use depthtection::config::DepthtectionConfig;
use depthtection::io::ReplaySession;
use depthtection::system::{DepthtectionSystem, InboundMsg, RecordingSink};

fn main() -> Result<()> {
    let session_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data/session".to_string());
    let config = match std::env::args().nth(2) {
        Some(path) => DepthtectionConfig::from_yaml(&path)?,
        None => DepthtectionConfig::default(),
    };

    let log_level_filter = config
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);
    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    println!("Loading session from: {}", session_path);
    let session = ReplaySession::new(&session_path)?;
    println!(
        "Loaded {} detection messages, {} depth frames, {} color frames, {} clouds, {} transforms",
        session.detections.len(),
        session.depth_entries.len(),
        session.color_entries.len(),
        session.cloud_entries.len(),
        session.transforms.len()
    );

    let sink = RecordingSink::new();
    let mut system = DepthtectionSystem::new(config, sink.clone());
    system.submit(InboundMsg::CameraInfo(session.camera_info.clone()))?;

    let events = session.events();
    for event in &events {
        system.submit(session.load(event)?)?;
    }
    system.finish()?;
    info!("Replayed {} events", events.len());

    let snapshot = system.snapshot();
    let recording = sink.snapshot();
    println!("Final phase: {}", snapshot.phase);
    println!("Candidates: {}", snapshot.candidate_count);
    println!(
        "Published {} candidate updates, {} filtered clouds",
        recording.candidates.len(),
        recording.filtered_clouds.len()
    );
    match snapshot.best {
        Some(best) => {
            let p = best.position();
            println!(
                "Best candidate {} ({}) confidence {:.3} at [{:.3}, {:.3}, {:.3}]",
                best.id, best.class_label, best.confidence, p.x, p.y, p.z
            );
            if let Some(gt) = session.groundtruth.last() {
                let err = p - gt.point;
                println!("Error to last ground truth: {:.3} m", err.norm());
            }
        }
        None => println!("No candidate found"),
    }

    Ok(())
}
