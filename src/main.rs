//! Parrot - 自然语言桌面命令编排引擎
//!
//! 入口：初始化日志、加载配置、（可选）拉起 Ollama，然后在 stdin 上运行命令 REPL。
//! 每条命令先规划并展示摘要与动作，用户确认后才执行；续跑得到的新规划同样需要确认。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use parrot::agent::{create_orchestrator, ollama_client, prepare_ollama};
use parrot::config::{load_config, AppConfig};
use parrot::context::Session;
use parrot::desktop::SystemDesktop;
use parrot::dispatch::ActionStatus;
use parrot::PlanResult;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    parrot::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    // 持有子进程句柄直到退出
    let _ollama = match prepare_ollama(&cfg).await {
        Ok(server) => server,
        Err(e) => {
            tracing::warn!(error = %e, "Ollama is not ready, commands may fail");
            None
        }
    };

    let orchestrator = create_orchestrator(&cfg, Arc::new(SystemDesktop::new()))
        .context("Failed to create orchestrator")?;
    let mut session = Session::from_config(&cfg.session);
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("parrot ready (model {}). Type a command, :models, :clear or :quit.", cfg.llm.model);
    loop {
        prompt("> ").await?;
        let Some(line) = input.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":clear" => {
                session.clear();
                println!("Session cleared.");
            }
            ":models" => list_models(&cfg).await,
            command => {
                let cancel = cancel_on_ctrl_c();
                let plan = match orchestrator
                    .plan_in_session(&mut session, command, &cfg.llm.model, cancel.clone())
                    .await
                {
                    Ok(plan) => plan,
                    Err(e) => PlanResult::failed(e),
                };
                run_plan(plan, &mut input).await?;
                // 结束 Ctrl-C 监听任务
                cancel.cancel();
            }
        }
    }
    Ok(())
}

/// 展示规划、请求确认、执行，直到命令完成或用户拒绝
async fn run_plan(mut plan: PlanResult, input: &mut Input) -> anyhow::Result<()> {
    loop {
        print_plan(&plan);
        if !plan.is_pending() {
            return Ok(());
        }
        prompt("Execute? [y/N] ").await?;
        let answer = input.next_line().await?.unwrap_or_default();
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Skipped.");
            return Ok(());
        }
        let next = plan.execute_or_failure().await;
        print_outcomes(&plan);
        match next {
            Some(next_plan) => plan = next_plan,
            None => return Ok(()),
        }
    }
}

fn print_plan(plan: &PlanResult) {
    if plan.is_failure() {
        println!("! {}", plan.summary);
        return;
    }
    println!("{}", plan.summary);
    for (i, action) in plan.actions.iter().enumerate() {
        println!("  {}. [{}] {}", i + 1, action.id(), action.description());
    }
    print_outcomes(plan);
}

fn print_outcomes(plan: &PlanResult) {
    for outcome in plan.outcomes() {
        match &outcome.status {
            ActionStatus::Succeeded => {
                if let Some(text) = &outcome.output {
                    println!("{text}");
                } else {
                    println!("  ok: {}", outcome.description);
                }
            }
            ActionStatus::Skipped { reason } => {
                println!("  skipped: {} ({reason})", outcome.description)
            }
            ActionStatus::Failed { error } => {
                println!("  failed: {} ({error})", outcome.description)
            }
        }
    }
}

async fn list_models(cfg: &AppConfig) {
    match ollama_client(cfg).list_models().await {
        Ok(models) if models.is_empty() => println!("No models installed."),
        Ok(models) => {
            for m in models {
                let marker = if m.name == cfg.llm.model { "*" } else { " " };
                println!("{marker} {}", m.name);
            }
        }
        Err(e) => println!("! Cannot list models: {e}"),
    }
}

/// 当前命令的取消令牌；Ctrl-C 触发取消
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let watcher = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = watcher.cancelled() => {}
            r = tokio::signal::ctrl_c() => {
                if r.is_ok() {
                    tracing::info!("cancelling current command");
                    watcher.cancel();
                }
            }
        }
    });
    token
}

async fn prompt(text: &str) -> anyhow::Result<()> {
    let mut out = tokio::io::stdout();
    out.write_all(text.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}
