//! CLI command handlers for login, status, logout and token.

use std::sync::Arc;

use crate::auth::{
    AuthService, BrowserLauncher, EventSink, GrantEvent, NoBrowser, PollState, Scope,
    SystemBrowser,
};
use crate::config::GrantConfig;
use crate::error::Result;

use super::{LoginArgs, TokenArgs};

/// Handle `devicegrant login`.
pub async fn handle_login(config: GrantConfig, args: LoginArgs) -> Result<()> {
    for scope in &args.scopes {
        Scope::parse(scope)?;
    }
    let browser: Arc<dyn BrowserLauncher> = if args.no_browser {
        Arc::new(NoBrowser)
    } else {
        Arc::new(SystemBrowser)
    };
    let service = AuthService::new(config)?
        .with_browser(browser)
        .with_events(terminal_sink());

    let record = service.login(&args.scopes).await?;
    println!("✅ Logged in to {}", record.tenant);
    if !record.granted_scopes.is_empty() {
        println!("   Scopes: {}", join(&record.granted_scopes));
    }
    if record.refresh_token.is_none() {
        println!("⚠️  No refresh token issued; you will need to log in again when it expires.");
    }
    Ok(())
}

/// Handle `devicegrant status`.
pub async fn handle_status(config: GrantConfig) -> Result<()> {
    let service = AuthService::new(config)?;

    println!("🔐 Credential Status ({})\n", service.store().service());
    let Some(status) = service.status() else {
        println!("  ❌ Not logged in");
        return Ok(());
    };

    let state = if status.expired {
        "⚠️  Expired (will refresh on next use)"
    } else if status.refresh_due {
        "⚠️  Expiring soon (will refresh on next use)"
    } else {
        "✅ Valid"
    };
    println!("  Tenant:  {}", status.tenant);
    println!("  State:   {state}");
    println!(
        "  Expires: {}",
        status.expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!(
        "  Refresh: {}",
        if status.has_refresh_token {
            "available"
        } else {
            "none"
        }
    );
    println!("  Scopes:  {}", join(&status.granted_scopes));
    Ok(())
}

/// Handle `devicegrant logout`.
pub async fn handle_logout(config: GrantConfig) -> Result<()> {
    let service = AuthService::new(config)?;
    service.logout()?;
    println!("✅ Logged out from {}", service.store().service());
    Ok(())
}

/// Handle `devicegrant token`. Prints only the token on stdout.
pub async fn handle_token(config: GrantConfig, args: TokenArgs) -> Result<()> {
    let service = AuthService::new(config)?;
    let required: Vec<&str> = args.required.iter().map(String::as_str).collect();
    let token = service
        .gate()
        .authorize_scopes("token", &required)
        .await?
        .access_token;
    println!("{token}");
    Ok(())
}

/// Event sink that prints setup progress for an operator at a terminal.
pub fn terminal_sink() -> EventSink {
    Arc::new(|event: &GrantEvent| {
        if let Some(line) = describe_event(event) {
            println!("{line}");
        }
    })
}

/// Terminal line for a setup event, if it deserves one.
pub fn describe_event(event: &GrantEvent) -> Option<String> {
    match event {
        GrantEvent::VerificationRequired {
            user_code,
            verification_uri,
        } => Some(format!(
            "🔗 Visit: {verification_uri}\n📋 Enter code: {user_code}"
        )),
        GrantEvent::BrowserOpened { .. } => Some("🌐 Opened the verification page".to_string()),
        GrantEvent::BrowserUnavailable { .. } => {
            Some("   Open the link above in any browser to continue".to_string())
        }
        GrantEvent::Waiting { attempt: 1, .. } => {
            Some("⏳ Waiting for authorization...".to_string())
        }
        GrantEvent::Waiting { .. } => None,
        GrantEvent::SlowDown { interval } => Some(format!(
            "   Server asked to slow down; polling every {}s",
            interval.as_secs()
        )),
        GrantEvent::Finished { state } => match state {
            PollState::Denied => Some("❌ Authorization denied".to_string()),
            PollState::Expired => Some("❌ Device code expired, please try again".to_string()),
            _ => None,
        },
    }
}

fn join(scopes: &std::collections::BTreeSet<String>) -> String {
    if scopes.is_empty() {
        return "(none)".to_string();
    }
    scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}
