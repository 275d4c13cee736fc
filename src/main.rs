//! WebPilot - 浏览器智能体命令行入口
//!
//! 用法：`webpilot <任务描述>`；不带参数时在控制台询问任务。
//! 日志写 stderr，过程事件打印到 stdout；Ctrl+C 取消当前任务并关闭浏览器。

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use webpilot::config::load_config;
use webpilot::core::{AgentError, ShutdownManager};
use webpilot::human::{ConsoleHuman, HumanPort};
use webpilot::react::{AgentEvent, RunOutcome};
use webpilot::{observability, run_task};

fn print_event(ev: &AgentEvent) {
    match (ev, ev.console_line()) {
        (AgentEvent::Error { .. }, Some(line)) => eprintln!("{}", line),
        (_, Some(line)) => println!("{}", line),
        (_, None) => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let human = Arc::new(ConsoleHuman::new());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let task = if args.is_empty() {
        human
            .ask("What should I do in the browser?")
            .await
            .context("Failed to read task")?
    } else {
        args.join(" ")
    };
    if task.trim().is_empty() {
        anyhow::bail!("No task given");
    }

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            print_event(&ev);
        }
    });

    let result = run_task(&cfg, task.trim(), human, Some(event_tx), shutdown.token()).await;
    let _ = printer.await;

    match result {
        Ok(run) => {
            match run.outcome {
                RunOutcome::Completed { .. } => {}
                RunOutcome::Answered { text } => println!("\n{}", text),
            }
            tracing::info!(turns = run.turns, "task complete");
            Ok(())
        }
        Err(AgentError::Cancelled) => {
            println!("\nTask cancelled.");
            Ok(())
        }
        Err(e) => Err(e).context("Task failed"),
    }
}
