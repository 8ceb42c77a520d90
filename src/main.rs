// ==========================================
// 集装箱分配系统 - 命令行入口
// ==========================================
// 用法:
//   container-alloc [db_path] batch
//   container-alloc [db_path] allocate <order_id>
//   container-alloc [db_path] remove <order_id>
//   container-alloc [db_path] refund <order_id>
//   container-alloc [db_path] unlink <order_id>
//   container-alloc [db_path] validate
//   container-alloc [db_path] overview
//   container-alloc [db_path] logs [limit]
// 输出: JSON 报告（stdout）
// ==========================================

use container_alloc::{logging, AllocationApi};
use serde::Serialize;
use std::error::Error;

const DEFAULT_DB_PATH: &str = "container_alloc.db";
const COMMANDS: &[&str] = &[
    "batch", "allocate", "remove", "refund", "unlink", "validate", "overview", "logs",
];
const CLI_ACTOR: &str = "cli";

fn main() -> Result<(), Box<dyn Error>> {
    logging::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = match args.first() {
        Some(first) if !COMMANDS.contains(&first.as_str()) => args.remove(0),
        _ => DEFAULT_DB_PATH.to_string(),
    };
    let command = args.first().cloned().ok_or_else(usage)?;
    let target = args.get(1).map(String::as_str);

    tracing::info!(
        db_path = %db_path,
        command = %command,
        version = container_alloc::VERSION,
        "{}",
        container_alloc::APP_NAME
    );
    let api = AllocationApi::open(&db_path)?;
    let actor = Some(CLI_ACTOR);

    match command.as_str() {
        "batch" => print_json(&api.run_batch_allocation(actor)?),
        "allocate" => print_json(&api.allocate_single_order(required(target)?, actor)?),
        "remove" => print_json(&api.delete_order(required(target)?, actor)?),
        "refund" => print_json(&api.refund_order(required(target)?, actor)?),
        "unlink" => print_json(&api.unlink_order(required(target)?, actor)?),
        "validate" => {
            let report = api.validate_allocation()?;
            print_json(&report)?;
            if !report.is_consistent() {
                std::process::exit(2);
            }
            Ok(())
        }
        "overview" => print_json(&api.capacity_overview()?),
        "logs" => {
            let limit = target.map(str::parse::<usize>).transpose()?.unwrap_or(20);
            print_json(&api.recent_allocation_logs(limit)?)
        }
        _ => Err(usage()),
    }
}

fn required(target: Option<&str>) -> Result<&str, Box<dyn Error>> {
    target.ok_or_else(usage)
}

fn usage() -> Box<dyn Error> {
    format!(
        "用法: container-alloc [db_path] <{}> [order_id|limit]",
        COMMANDS.join("|")
    )
    .into()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
