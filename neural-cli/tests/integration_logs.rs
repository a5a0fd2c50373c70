use std::process::Command;
use tempfile::TempDir;

#[test]
fn test_status_emits_json_logs_and_log_file() {
    let temp_dir = TempDir::new().unwrap();
    let log_dir = temp_dir.path().join("logs");
    let config = serde_json::json!({ "logging": { "dir": log_dir } });
    std::fs::write(temp_dir.path().join("config.json"), config.to_string()).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_neural"))
        .args(["status", "--config-dir"])
        .arg(temp_dir.path())
        .env("RUST_LOG", "info")
        .env("LOG_FORMAT", "json")
        .env("ENV_STORAGE_MODE", "supabase")
        .env_remove("SUPABASE_URL")
        .env_remove("SUPABASE_ANON_KEY")
        .env_remove("GROQ_API_KEY")
        .output()
        .expect("Failed to run neural");

    let stdout = String::from_utf8_lossy(&output.stdout);
    println!("STDOUT:\n{}", stdout);
    println!("STDERR:\n{}", String::from_utf8_lossy(&output.stderr));

    assert!(output.status.success());
    assert!(stdout.contains("Neural Status"));

    // Missing credentials degrade to environment-only storage and say so
    let warning = stdout.lines().find(|line| {
        line.trim_start().starts_with('{') && line.contains("SUPABASE_URL or SUPABASE_ANON_KEY")
    });
    let warning: serde_json::Value = serde_json::from_str(warning.expect("no JSON warning")).unwrap();
    assert_eq!(warning["level"], "WARN");

    let rolled = std::fs::read_dir(&log_dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.file_name().to_string_lossy().starts_with("neural.log"));
    assert!(rolled, "expected a neural.log.* file in {:?}", log_dir);
}
