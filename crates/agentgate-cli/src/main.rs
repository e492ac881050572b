// agentgate-cli/src/main.rs
// ============================================================================
// Module: AgentGate CLI Entry Point
// Description: Thin command dispatcher for starting the gateway and driving
//              its admin HTTP surface.
// Purpose: Provide an operator-facing binary without duplicating any
//          enforcement logic.
// Dependencies: agentgate-server, clap, reqwest, tokio
// ============================================================================

//! ## Overview
//! `agentgate` has two jobs: `serve` starts the HTTP gateway in-process, and
//! every other subcommand is a thin `reqwest` client against the running
//! gateway's `X-API-Key`-gated admin surface. No enforcement decision is
//! ever made here.

use std::io::Write;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;

/// Writes a single line to stdout without going through `println!`.
fn write_stdout_line(message: &str) {
    let mut stdout = std::io::stdout();
    let _ = writeln!(&mut stdout, "{message}");
}

/// Writes a single line to stderr without going through `eprintln!`.
fn write_stderr_line(message: &str) {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "{message}");
}

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "agentgate", disable_help_subcommand = true, arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway, reading configuration from the environment.
    Serve,
    /// Create an approval workflow.
    CreateWorkflow(CreateWorkflowArgs),
    /// Approve a pending workflow step.
    Approve(WorkflowApproverArgs),
    /// Delegate a workflow step to another approver.
    Delegate(DelegateArgs),
    /// Create a time-bound policy exception.
    CreateException(CreateExceptionArgs),
    /// List unrevoked policy exceptions.
    ListExceptions(AdminTargetArgs),
    /// List active session incidents.
    ListIncidents(AdminTargetArgs),
    /// Release a session from quarantine.
    ReleaseIncident(ReleaseIncidentArgs),
    /// Start a canary rollout between two policy versions.
    StartRollout(StartRolloutArgs),
    /// Force a rollout into rolled-back state.
    RollbackRollout(RollbackRolloutArgs),
}

/// Shared flags every admin subcommand needs: where the gateway is and how
/// to authenticate to it.
#[derive(Args, Debug)]
struct AdminTargetArgs {
    /// Base URL of the running gateway, e.g. `http://localhost:8080`.
    #[arg(long, env = "AGENTGATE_SERVER_URL")]
    server_url: String,
    /// Value for the `X-API-Key` admin header.
    #[arg(long, env = "AGENTGATE_ADMIN_API_KEY")]
    api_key: String,
}

#[derive(Args, Debug)]
struct CreateWorkflowArgs {
    #[command(flatten)]
    target: AdminTargetArgs,
    #[arg(long)]
    session_id: String,
    #[arg(long)]
    tool_name: String,
    #[arg(long)]
    required_steps: u32,
    #[arg(long = "approver", required = true)]
    required_approvers: Vec<String>,
}

#[derive(Args, Debug)]
struct WorkflowApproverArgs {
    #[command(flatten)]
    target: AdminTargetArgs,
    #[arg(long)]
    workflow_id: String,
    #[arg(long)]
    approver_id: String,
}

#[derive(Args, Debug)]
struct DelegateArgs {
    #[command(flatten)]
    target: AdminTargetArgs,
    #[arg(long)]
    workflow_id: String,
    #[arg(long)]
    from: String,
    #[arg(long)]
    to: String,
}

#[derive(Args, Debug)]
struct CreateExceptionArgs {
    #[command(flatten)]
    target: AdminTargetArgs,
    #[arg(long)]
    tool_name: String,
    #[arg(long)]
    reason: String,
    #[arg(long)]
    created_by: String,
    #[arg(long)]
    expires_in_seconds: i64,
    #[arg(long)]
    session_id: Option<String>,
    #[arg(long)]
    tenant_id: Option<String>,
}

#[derive(Args, Debug)]
struct ReleaseIncidentArgs {
    #[command(flatten)]
    target: AdminTargetArgs,
    #[arg(long)]
    session_id: String,
    #[arg(long)]
    released_by: String,
}

#[derive(Args, Debug)]
struct StartRolloutArgs {
    #[command(flatten)]
    target: AdminTargetArgs,
    #[arg(long)]
    tenant_id: String,
    #[arg(long)]
    baseline_version: String,
    #[arg(long)]
    candidate_version: String,
    #[arg(long, default_value_t = 0.0)]
    error_rate: f64,
}

#[derive(Args, Debug)]
struct RollbackRolloutArgs {
    #[command(flatten)]
    target: AdminTargetArgs,
    #[arg(long)]
    rollout_id: String,
    #[arg(long)]
    reason: Option<String>,
}

/// Errors surfaced to the CLI's exit code.
#[derive(Debug, Error)]
enum CliError {
    /// The gateway's admin surface could not be built or started.
    #[error("failed to start the gateway: {0}")]
    Serve(#[from] agentgate_server::ServerError),
    /// The admin HTTP call failed at the transport layer.
    #[error("admin request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The gateway responded with a non-2xx status.
    #[error("admin request returned {status}: {body}")]
    Admin {
        /// HTTP status returned.
        status: reqwest::StatusCode,
        /// Response body, if any.
        body: String,
    },
    /// The gateway could not bind its listening socket.
    #[error("failed to bind server address: {0}")]
    Bind(std::io::Error),
}

fn admin_client(_target: &AdminTargetArgs) -> reqwest::blocking::Client {
    reqwest::blocking::Client::new()
}

fn send_admin_request(request: reqwest::blocking::RequestBuilder, api_key: &str) -> Result<serde_json::Value, CliError> {
    let response = request.header("X-API-Key", api_key).send()?;
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(CliError::Admin { status, body });
    }
    Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
}

fn run_serve() -> Result<(), CliError> {
    let router = agentgate_server::build_router()?;
    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Bind)?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.map_err(CliError::Bind)?;
        axum::serve(listener, router).await.map_err(CliError::Bind)
    })
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => run_serve(),
        Commands::CreateWorkflow(args) => {
            let client = admin_client(&args.target);
            let body = serde_json::json!({
                "session_id": args.session_id,
                "tool_name": args.tool_name,
                "required_steps": args.required_steps,
                "required_approvers": args.required_approvers,
            });
            let result = send_admin_request(client.post(format!("{}/admin/approvals/workflows", args.target.server_url)).json(&body), &args.target.api_key)?;
            write_stdout_line(&result.to_string());
            Ok(())
        }
        Commands::Approve(args) => {
            let client = admin_client(&args.target);
            let body = serde_json::json!({ "approver_id": args.approver_id });
            let result = send_admin_request(
                client.post(format!("{}/admin/approvals/workflows/{}/approve", args.target.server_url, args.workflow_id)).json(&body),
                &args.target.api_key,
            )?;
            write_stdout_line(&result.to_string());
            Ok(())
        }
        Commands::Delegate(args) => {
            let client = admin_client(&args.target);
            let body = serde_json::json!({ "from": args.from, "to": args.to });
            let result = send_admin_request(
                client.post(format!("{}/admin/approvals/workflows/{}/delegate", args.target.server_url, args.workflow_id)).json(&body),
                &args.target.api_key,
            )?;
            write_stdout_line(&result.to_string());
            Ok(())
        }
        Commands::CreateException(args) => {
            let client = admin_client(&args.target);
            let body = serde_json::json!({
                "tool_name": args.tool_name,
                "reason": args.reason,
                "created_by": args.created_by,
                "expires_in_seconds": args.expires_in_seconds,
                "session_id": args.session_id,
                "tenant_id": args.tenant_id,
            });
            let result = send_admin_request(client.post(format!("{}/admin/exceptions", args.target.server_url)).json(&body), &args.target.api_key)?;
            write_stdout_line(&result.to_string());
            Ok(())
        }
        Commands::ListExceptions(target) => {
            let client = admin_client(&target);
            let result = send_admin_request(client.get(format!("{}/admin/exceptions", target.server_url)), &target.api_key)?;
            write_stdout_line(&result.to_string());
            Ok(())
        }
        Commands::ListIncidents(target) => {
            let client = admin_client(&target);
            let result = send_admin_request(client.get(format!("{}/admin/incidents", target.server_url)), &target.api_key)?;
            write_stdout_line(&result.to_string());
            Ok(())
        }
        Commands::ReleaseIncident(args) => {
            let client = admin_client(&args.target);
            let body = serde_json::json!({ "released_by": args.released_by });
            let result = send_admin_request(
                client.post(format!("{}/admin/incidents/{}/release", args.target.server_url, args.session_id)).json(&body),
                &args.target.api_key,
            )?;
            write_stdout_line(&result.to_string());
            Ok(())
        }
        Commands::StartRollout(args) => {
            let client = admin_client(&args.target);
            let body = serde_json::json!({
                "tenant_id": args.tenant_id,
                "baseline_version": args.baseline_version,
                "candidate_version": args.candidate_version,
                "error_rate": args.error_rate,
            });
            let result = send_admin_request(client.post(format!("{}/admin/rollouts/start", args.target.server_url)).json(&body), &args.target.api_key)?;
            write_stdout_line(&result.to_string());
            Ok(())
        }
        Commands::RollbackRollout(args) => {
            let client = admin_client(&args.target);
            let body = serde_json::json!({ "reason": args.reason });
            let result = send_admin_request(
                client.post(format!("{}/admin/rollouts/{}/rollback", args.target.server_url, args.rollout_id)).json(&body),
                &args.target.api_key,
            )?;
            write_stdout_line(&result.to_string());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            write_stderr_line(&format!("error: {err}"));
            ExitCode::FAILURE
        }
    }
}
