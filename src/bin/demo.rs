//! Minimal end-to-end wiring: load a service config and its templates, start the
//! gateway, and print value updates as they arrive.

use std::collections::HashMap;
use std::path::PathBuf;

use gatesrv::config::{ServiceConfig, TemplateConfig};
use gatesrv::gateway::Gateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let mut args = std::env::args().skip(1);
    let service_path = args.next().unwrap_or_else(|| "service.yaml".into());
    let template_dir = args.next().unwrap_or_else(|| "templates".into());

    let service = ServiceConfig::from_yaml_file(&service_path)?;

    let mut templates = HashMap::new();
    for device in &service.devices {
        if templates.contains_key(&device.template) {
            continue;
        }
        let path = PathBuf::from(&template_dir).join(format!("{}.yaml", device.template));
        let template = TemplateConfig::from_yaml_file(&path)?;
        templates.insert(device.template.clone(), template);
    }

    let gateway = Gateway::start(service, templates).await;

    for device_id in gateway.list_device_ids() {
        tracing::info!(device = %device_id, "registered device");
    }

    tokio::signal::ctrl_c().await?;
    Ok(())
}
