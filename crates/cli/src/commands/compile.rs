//! `promptc compile`: compile one prompt and print it.

use super::{CmdResult, build_compiler, load_config};
use crate::CompileArgs;
use promptc_core::call::CallContext;
use promptc_core::context::{CompilationContext, Intent};
use std::path::Path;

pub fn context_from_args(args: &CompileArgs, default_budget: i64) -> CompilationContext {
    let mut intent = Intent::new(&args.verb).with_category(&args.category);
    if let Some(target) = &args.target {
        intent = intent.with_target(target);
    }
    let mut cc = CompilationContext::new(&args.shard, intent, args.budget.unwrap_or(default_budget))
        .with_tags(args.tags.iter().cloned());
    if let Some(session) = &args.session {
        cc = cc.with_session(session);
    }
    if let Some(query) = &args.query {
        cc = cc.with_query(query);
    }
    cc
}

pub async fn run(config_path: Option<&Path>, args: CompileArgs) -> CmdResult {
    let config = load_config(config_path)?;
    let compiler = build_compiler(&config).await?;
    let cc = context_from_args(&args, config.compiler.default_budget);

    let result = compiler.compile(&CallContext::background(), &cc).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.text);
    eprintln!(
        "\n── {} atoms, {} tokens (budget {}), {} mandatory, context {} @ {}",
        result.included_atoms.len(),
        result.total_tokens,
        cc.budget,
        result.mandatory_count,
        result.context_hash.short(),
        result.state_version
    );
    for warning in &result.warnings {
        eprintln!("   ⚠️  {warning}");
    }
    Ok(())
}
