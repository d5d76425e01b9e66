use anyhow::Result;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxturn::integration::{OrchestratorBuilder, OrchestratorEvent, TurnState};
use voxturn::llm::ScriptedModel;
use voxturn::speech::{CaptureStep, MockSynthesizer, ScriptedCapture, VoiceSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxturn=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting voxturn demo session");

    let settings = match std::env::var("VOXTURN_SETTINGS") {
        Ok(json) => VoiceSettings::from_json(&json)?,
        Err(_) => VoiceSettings::default().with_push_to_talk(true),
    };

    let capture = ScriptedCapture::new().then_script(vec![
        CaptureStep::Level(0.4),
        CaptureStep::interim("tell me about"),
        CaptureStep::Pause(Duration::from_millis(200)),
        CaptureStep::interim("tell me about your last project"),
        CaptureStep::AwaitStop,
        CaptureStep::final_text("Tell me about your last project."),
    ]);
    let model = ScriptedModel::reply(&[
        "Sure! ",
        "I built a streaming ",
        "parser in Rust. It handled ",
        "malformed input gracefully.",
    ])
    .with_fragment_delay(Duration::from_millis(80));
    let synthesis = MockSynthesizer::with_duration(Duration::from_millis(400));

    let (orchestrator, handle) = OrchestratorBuilder::new()
        .with_settings(settings)
        .with_capture(capture)
        .with_model(model)
        .with_synthesis(synthesis.clone())
        .build()?;
    let task = orchestrator.spawn();

    handle.start_listening()?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.stop_listening()?;

    let events = handle.event_receiver();
    let mut finished = false;
    while !finished {
        tokio::time::sleep(Duration::from_millis(20)).await;
        for event in events.try_iter() {
            match event {
                OrchestratorEvent::TranscriptUpdated { final_text, interim } => {
                    info!("Heard: {} [{}]", final_text, interim);
                }
                OrchestratorEvent::SpeakingSentence(sentence) => {
                    info!("Speaking #{}: {}", sentence.index, sentence.text);
                }
                OrchestratorEvent::TurnFinished { metrics, .. } => {
                    info!(
                        "Reply done: first fragment {:?}ms, first speech {:?}ms, total {}ms",
                        metrics.first_fragment_ms, metrics.first_speech_ms, metrics.total_ms
                    );
                }
                OrchestratorEvent::StateChanged { to, .. } if to == TurnState::Idle => {
                    finished = true;
                }
                OrchestratorEvent::Error(e) => info!("{}", e.user_message()),
                _ => {}
            }
        }
    }

    for turn in handle.history() {
        info!("{}: {}", turn.role.as_str(), turn.content);
    }
    info!("Spoke {} sentences", synthesis.completed().len());

    handle.shutdown()?;
    task.await?;

    Ok(())
}
