//! `executors status` and `executors next`.

use anyhow::Result;
use kestrel_core::OutputFormat;

use crate::context::AppContext;

pub fn handle_status(ctx: &AppContext, format: OutputFormat) -> Result<i32> {
    match format {
        OutputFormat::Text => println!("{}", ctx.scheduler.to_display_string()),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&ctx.scheduler.summary())?)
        }
    }
    Ok(0)
}

pub fn handle_next(ctx: &mut AppContext, count: u32) -> Result<i32> {
    for name in pick_names(ctx, count) {
        println!("{name}");
    }
    Ok(0)
}

fn pick_names(ctx: &mut AppContext, count: u32) -> Vec<String> {
    (0..count)
        .map(|_| ctx.scheduler.next().name.clone())
        .collect()
}
