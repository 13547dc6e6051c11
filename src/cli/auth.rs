//! CLI command handlers.

use std::io::Write;

use crate::client::SessionClient;
use crate::http::RequestDescriptor;
use crate::session::SessionStatus;

/// Handle `homebase status`.
pub async fn handle_status(client: &SessionClient) -> Result<(), Box<dyn std::error::Error>> {
    let status = client.session().bootstrap().await;
    match status {
        SessionStatus::Authenticated => println!("✅ Logged in ({})", client.config().base_url()),
        SessionStatus::Unauthenticated => println!("❌ Not logged in"),
        SessionStatus::Checking => println!("⏳ Session check did not finish"),
    }
    Ok(())
}

/// Handle `homebase login <phone>`.
pub async fn handle_login(
    client: &SessionClient,
    phone: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let message = client.auth().send_otp(phone).await?;
    println!("📨 {message}");
    print!("📋 Enter the code: ");
    std::io::stdout().flush()?;

    let mut otp = String::new();
    std::io::stdin().read_line(&mut otp)?;
    let otp = otp.trim();
    if otp.is_empty() {
        return Err("no code provided".into());
    }

    let pair = client.auth().verify_otp(phone, otp).await?;
    client.session().login(pair)?;
    println!("✅ Logged in");
    Ok(())
}

/// Handle `homebase logout`.
pub async fn handle_logout(client: &SessionClient) -> Result<(), Box<dyn std::error::Error>> {
    client.session().logout();
    println!("✅ Logged out");
    Ok(())
}

/// Handle `homebase get <path>`.
pub async fn handle_get(
    client: &SessionClient,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if client.session().bootstrap().await != SessionStatus::Authenticated {
        return Err("not logged in; run `homebase login <phone>` first".into());
    }
    let body: serde_json::Value = client
        .pipeline()
        .execute_json(RequestDescriptor::get(path))
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
