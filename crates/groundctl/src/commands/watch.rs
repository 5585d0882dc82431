//! Live telemetry for one surface.
//!
//! Connects with the data stream attached, opens a surface session and
//! prints the resolved devices each time they change. Structured output
//! formats emit one document per update.

use serde::Serialize;
use tabled::Tabled;

use groundctl_core::{
    Controller, ControllerConfig, CoreError, DeviceRecord, MergeReport, Surface, SurfaceSession,
    SurfaceUpdate,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Device")]
    name: String,
    #[tabled(rename = "Type")]
    sensor_type: String,
    #[tabled(rename = "Ch")]
    channel: u32,
    #[tabled(rename = "Commanded")]
    commanded: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn device_row(record: &DeviceRecord, color: bool) -> DeviceRow {
    match record {
        DeviceRecord::Valve(v) => DeviceRow {
            name: v.name.clone(),
            sensor_type: v.sensor_type.to_string(),
            channel: v.channel,
            commanded: output::valve_state(v.commanded, color),
            value: output::valve_state(v.actual, color),
        },
        DeviceRecord::Sensor(s) => DeviceRow {
            name: s.name.clone(),
            sensor_type: s.sensor_type.to_string(),
            channel: s.channel,
            commanded: String::new(),
            value: format!("{:.2} {}", s.value, s.unit),
        },
    }
}

#[derive(Serialize)]
struct Frame<'a> {
    surface: &'a Surface,
    configuration_revision: u64,
    running: Vec<&'a str>,
    devices: &'a [DeviceRecord],
}

pub async fn handle(
    args: WatchArgs,
    config: ControllerConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut config = config;
    config.stream_enabled = true;
    let address = config
        .server_address
        .clone()
        .ok_or(CoreError::NotConnected)?;

    let controller = Controller::from_config(config)?;
    controller.connect(&address).await?;
    controller.refresh_configs().await?;

    let surface = Surface::new(args.surface, args.board);
    let mut session = controller.open_surface(surface);
    let color = output::should_color(&global.color);

    print_frame(&session, global, color)?;
    let mut printed = 1_usize;

    loop {
        if args.count.is_some_and(|limit| printed >= limit) {
            break;
        }
        let update = tokio::select! {
            update = session.next() => update,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(update) = update else { break };

        let show = match update {
            SurfaceUpdate::State { rebuilt, .. } => rebuilt,
            SurfaceUpdate::Telemetry(ref report) | SurfaceUpdate::Resynced(ref report) => {
                log_faults(report);
                report.has_changes()
            }
        };
        if show {
            print_frame(&session, global, color)?;
            printed += 1;
        }
    }

    controller.shutdown().await;
    Ok(())
}

fn print_frame(session: &SurfaceSession, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    let view = session.view();
    let records = view.board().records();

    let out = match global.output {
        OutputFormat::Table => {
            let rows: Vec<DeviceRow> = records.iter().map(|r| device_row(r, color)).collect();
            let running: Vec<&str> = view.running().iter().map(String::as_str).collect();
            let header = format!(
                "{} (revision {}){}",
                view.surface(),
                session.snapshot().configuration_revision,
                if running.is_empty() {
                    String::new()
                } else {
                    format!("  running: {}", running.join(", "))
                }
            );
            format!("{header}\n{}", output::render_table(&rows))
        }
        OutputFormat::Plain => records
            .iter()
            .map(|r| match r {
                DeviceRecord::Valve(v) => format!("{} {}", v.name, v.actual),
                DeviceRecord::Sensor(s) => format!("{} {}", s.name, s.value),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        ref format => {
            let frame = Frame {
                surface: view.surface(),
                configuration_revision: session.snapshot().configuration_revision,
                running: view.running().iter().map(String::as_str).collect(),
                devices: records,
            };
            // One document per update: compact JSON keeps NDJSON framing.
            let format = match format {
                OutputFormat::Json => &OutputFormat::JsonCompact,
                other => other,
            };
            output::render_single(format, &frame, |_| String::new(), |_| String::new())?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

fn log_faults(report: &MergeReport) {
    for fault in &report.faults {
        tracing::warn!(%fault, "telemetry not applied");
    }
}
