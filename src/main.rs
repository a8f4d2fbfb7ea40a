use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use clinic_assistant::config::AppConfig;
use clinic_assistant::db;
use clinic_assistant::handlers;
use clinic_assistant::services::ai::ollama::OllamaProvider;
use clinic_assistant::services::ai::openai::OpenAiProvider;
use clinic_assistant::services::ai::LlmProvider;
use clinic_assistant::services::booking::BookingService;
use clinic_assistant::services::calendar::google::GoogleCalendarProvider;
use clinic_assistant::services::calendar::local::LocalCalendar;
use clinic_assistant::services::calendar::CalendarProvider;
use clinic_assistant::services::conversation::ConversationEngine;
use clinic_assistant::services::nlu::dialogflow::DialogflowAdapter;
use clinic_assistant::services::nlu::llm::LlmIntentResolver;
use clinic_assistant::services::nlu::NluAdapter;
use clinic_assistant::services::schedule::ScheduleService;
use clinic_assistant::services::session::InMemorySessionStore;
use clinic_assistant::state::AppState;

fn build_llm(config: &AppConfig, timeout: Duration) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let llm: Arc<dyn LlmProvider> = match config.llm_provider.as_str() {
        "openai" => {
            anyhow::ensure!(
                !config.openai_api_key.is_empty(),
                "OPENAI_API_KEY must be set when LLM_PROVIDER=openai"
            );
            tracing::info!("using OpenAI LLM provider (model: {})", config.openai_model);
            Arc::new(OpenAiProvider::new(
                config.openai_base_url.clone(),
                config.openai_api_key.clone(),
                config.openai_model.clone(),
                timeout,
            ))
        }
        "groq" => {
            anyhow::ensure!(
                !config.groq_api_key.is_empty(),
                "GROQ_API_KEY must be set when LLM_PROVIDER=groq"
            );
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Arc::new(OpenAiProvider::groq(
                config.groq_api_key.clone(),
                config.groq_model.clone(),
                timeout,
            ))
        }
        _ => {
            tracing::info!(
                "using Ollama LLM provider (url: {}, model: {})",
                config.ollama_url,
                config.ollama_model
            );
            Arc::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
                timeout,
            ))
        }
    };
    Ok(llm)
}

fn build_nlu(
    config: &AppConfig,
    schedule: Arc<ScheduleService>,
    timeout: Duration,
) -> anyhow::Result<Arc<dyn NluAdapter>> {
    let nlu: Arc<dyn NluAdapter> = match config.nlu_provider.as_str() {
        "dialogflow" => {
            anyhow::ensure!(
                !config.dialogflow_project_id.is_empty(),
                "DIALOGFLOW_PROJECT_ID must be set when NLU_PROVIDER=dialogflow"
            );
            anyhow::ensure!(
                !config.dialogflow_access_token.is_empty(),
                "DIALOGFLOW_ACCESS_TOKEN must be set when NLU_PROVIDER=dialogflow"
            );
            tracing::info!(
                "using Dialogflow NLU (project: {})",
                config.dialogflow_project_id
            );
            Arc::new(DialogflowAdapter::new(
                config.dialogflow_project_id.clone(),
                config.dialogflow_access_token.clone(),
                config.dialogflow_language.clone(),
                timeout,
            ))
        }
        _ => {
            tracing::info!("using LLM NLU");
            Arc::new(LlmIntentResolver::new(
                build_llm(config, timeout)?,
                schedule,
                config.clinic_timezone,
            ))
        }
    };
    Ok(nlu)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    let timeout = Duration::from_secs(config.http_timeout_secs);

    let conn = db::init_db(&config.database_url)?;
    let db = Arc::new(Mutex::new(conn));

    let calendar: Arc<dyn CalendarProvider> = if config.google_calendar_token.is_empty() {
        tracing::warn!("GOOGLE_CALENDAR_TOKEN not set, keeping calendar events in memory");
        Arc::new(LocalCalendar::new())
    } else {
        tracing::info!(
            "using Google Calendar (calendar: {})",
            config.google_calendar_id
        );
        Arc::new(GoogleCalendarProvider::new(
            config.google_calendar_token.clone(),
            config.google_calendar_id.clone(),
            timeout,
        ))
    };

    let schedule = Arc::new(ScheduleService::new(db.clone()));
    let booking = Arc::new(BookingService::new(
        db.clone(),
        calendar,
        config.appointment_minutes,
        config.clinic_timezone.name().to_string(),
    ));
    let nlu = build_nlu(&config, schedule.clone(), timeout)?;

    let engine = ConversationEngine::new(
        nlu,
        schedule.clone(),
        booking,
        Arc::new(InMemorySessionStore::new()),
    );

    let state = Arc::new(AppState {
        db,
        engine,
        schedule,
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
