//! galchat REPL.
//!
//! A thin terminal front-end over the advisor service: type what the other
//! party said, get five styled reply options, pick one by letter. The
//! two-phase commander flow is available via `:analyze` / `:confirm`.

use anyhow::{Context, Result};
use colored::Colorize;
use galchat_application::{AdvisorService, AnalysisOutcome, GenerationOutcome, TemplateOptimizer};
use galchat_core::config::AdvisorConfig;
use galchat_core::dialog::option::{DialogOption, OptionLabel};
use galchat_core::gateway::ChatBackend;
use galchat_infrastructure::{FileStateRepository, JsonEngagementStore, JsonSessionRepository};
use galchat_interaction::{SiliconFlowApiAgent, WenxinApiAgent};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const LOCAL_USER_ID: &str = "local";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = AdvisorConfig::from_env();

    let backend: Arc<dyn ChatBackend> = match std::env::var("GALCHAT_BACKEND").as_deref() {
        Ok("wenxin") => Arc::new(WenxinApiAgent::try_from_env().context("configuring Wenxin")?),
        _ => Arc::new(
            SiliconFlowApiAgent::try_from_env()
                .context("configuring SiliconFlow")?
                .with_config(&config),
        ),
    };

    let base_dir = dirs::home_dir()
        .context("could not determine home directory")?
        .join(".galchat");
    let session_repository = Arc::new(JsonSessionRepository::new(&base_dir)?);
    let state_repository = Arc::new(FileStateRepository::new(&base_dir)?);
    let store = Arc::new(JsonEngagementStore::new(&base_dir)?);

    let service = AdvisorService::new(
        session_repository,
        state_repository,
        backend,
        config,
    )
    .with_selection_log(store.clone());
    let optimizer = TemplateOptimizer::new(store.clone(), store.clone(), store);

    let mut advisor = match service.restore_last_session().await? {
        Some(advisor) => advisor,
        None => service.create_session().await?,
    };

    println!("{}", "galchat — 输入对方的消息，回车生成回应选项".bold());
    println!("{}", "命令: A-E 选择选项 | :new | :sessions | :open <id> | :analyze <文本> | :confirm | :cancel | :quit".dimmed());

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        match input {
            ":quit" | ":q" => break,
            ":new" => {
                advisor = service.create_session().await?;
                println!("{}", "已开启新对话".green());
            }
            ":sessions" => {
                for summary in service.list_sessions().await? {
                    println!(
                        "{}  {}  {}",
                        summary.id.dimmed(),
                        summary.title.bold(),
                        summary.last_message.dimmed()
                    );
                }
            }
            ":confirm" => match advisor.confirm_tactics().await {
                Ok(outcome) => render_generation(&advisor, outcome).await,
                Err(e) => println!("{}", e.to_string().red()),
            },
            ":cancel" => match advisor.cancel_tactics().await {
                Ok(()) => println!("{}", "已取消战术确认".yellow()),
                Err(e) => println!("{}", e.to_string().red()),
            },
            _ if input.starts_with(":open ") => {
                let session_id = input.trim_start_matches(":open ").trim();
                match service.open_session(session_id).await {
                    Ok(opened) => {
                        advisor = opened;
                        println!("{}", "已切换对话".green());
                    }
                    Err(e) => println!("{}", e.to_string().red()),
                }
            }
            _ if input.starts_with(":analyze ") => {
                let text = input.trim_start_matches(":analyze ").trim();
                match advisor.analyze(text).await? {
                    AnalysisOutcome::Analyzed(analysis) => {
                        println!("{} {}", "局势:".bold(), analysis.summary);
                        println!("{} {}", "意图:".bold(), analysis.intent);
                        println!("{} {}", "策略:".bold(), analysis.strategy);
                        println!(
                            "{}",
                            "输入 :confirm 按此策略生成选项，或 :cancel 放弃".dimmed()
                        );
                    }
                    AnalysisOutcome::Cancelled => {}
                    AnalysisOutcome::Failed { message } => println!("{}", message.red()),
                }
            }
            _ if input.starts_with(':') => println!("{}", "未知命令".red()),
            _ if input.len() == 1 => match input.chars().next().and_then(OptionLabel::from_char) {
                Some(label) => match advisor.select_option(label).await {
                    Ok(option) => {
                        println!("{} {}", "已选择:".green(), option.text);
                        if let Err(e) = optimizer
                            .record_selection(advisor.session_id(), LOCAL_USER_ID, &option)
                            .await
                        {
                            tracing::warn!("selection recording failed: {}", e);
                        }
                    }
                    Err(e) => println!("{}", e.to_string().red()),
                },
                None => println!("{}", "未知命令".red()),
            },
            text => {
                let outcome = advisor.submit_text(text).await?;
                render_generation(&advisor, outcome).await;
            }
        }
    }

    Ok(())
}

async fn render_generation(
    advisor: &Arc<galchat_application::DialogueAdvisor>,
    outcome: GenerationOutcome,
) {
    match outcome {
        GenerationOutcome::Completed { is_fallback, .. } => {
            if is_fallback {
                println!("{}", "⚠️ 回复解析降级，以下为兜底选项".yellow());
            }
            let session = advisor.snapshot().await;
            if let Some(message) = session.pending_options() {
                if !message.content.is_empty() {
                    println!("{}", message.content.italic());
                }
                for option in &message.options {
                    print_option(option);
                }
            }
        }
        GenerationOutcome::Cancelled => {}
        GenerationOutcome::Failed { message } => println!("{}", message.red()),
    }
}

fn print_option(option: &DialogOption) {
    let favor = if option.favor_change >= 0 {
        format!("{:+}", option.favor_change).green()
    } else {
        format!("{:+}", option.favor_change).red()
    };
    println!(
        "{} {} {} {} {}",
        format!("{}.", option.id).cyan().bold(),
        option.text,
        option.kaomoji,
        format!("[{}]", option.style).dimmed(),
        favor,
    );
}
