use std::fs;
use std::path::Path;

const CONFIG_HEADER: &str = "ota_config.h";

/// (define name, exported env var)
const DEFINES: &[(&str, &str)] = &[
    ("WIFI_SSID", "WIFI_SSID"),
    ("WIFI_PASSWORD", "WIFI_PASSWORD"),
    ("OTA_FIRMWARE_URL", "OTA_FIRMWARE_URL"),
    ("OTA_PROXY_URL", "OTA_PROXY_URL"),
];

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF
    embuild::espidf::sysenv::output();

    println!("cargo:rerun-if-changed={}", CONFIG_HEADER);

    // Read update configuration if it exists
    let contents = if Path::new(CONFIG_HEADER).exists() {
        fs::read_to_string(CONFIG_HEADER)?
    } else {
        println!("cargo:warning=ota_config.h not found! Copy ota_config.h.example to ota_config.h and add your credentials.");
        String::new()
    };

    for (define, env) in DEFINES {
        let value = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.starts_with("//"))
            .find(|l| l.split_whitespace().nth(1) == Some(define) && l.starts_with("#define"))
            .and_then(|l| l.split('"').nth(1))
            .unwrap_or("");
        // Empty defaults keep env!() happy when a value is missing
        println!("cargo:rustc-env={}={}", env, value);
    }

    Ok(())
}
