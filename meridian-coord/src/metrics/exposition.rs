//! Prometheus text exposition of the dashboard snapshot.
//!
//! The HTTP endpoint is owned by the embedding application; this module
//! only renders the text format from a [`DashboardSnapshot`].

// Layer 1: Standard library imports
use std::fmt::Write;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::coordinator::snapshots::DashboardSnapshot;

const PREFIX: &str = "meridian";

/// Render the dashboard as Prometheus text exposition format.
pub fn render_prometheus(dashboard: &DashboardSnapshot) -> String {
    let mut out = String::with_capacity(1024 + dashboard.components.len() * 256);
    let memory = &dashboard.system.memory;

    gauge_header(&mut out, "total_memory_usage_bytes", "Total reserved memory");
    let _ = writeln!(
        out,
        "{PREFIX}_total_memory_usage_bytes {}",
        memory.total_usage
    );

    gauge_header(
        &mut out,
        "memory_usage_percentage",
        "Reserved memory as a percentage of the budget",
    );
    let _ = writeln!(
        out,
        "{PREFIX}_memory_usage_percentage {:.2}",
        memory.usage_fraction() * 100.0
    );

    gauge_header(&mut out, "component_count", "Registered components");
    let _ = writeln!(
        out,
        "{PREFIX}_component_count {}",
        dashboard.system.registered_components
    );

    gauge_header(
        &mut out,
        "component_memory_usage_bytes",
        "Per-component memory estimate",
    );
    for component in &dashboard.components {
        let _ = writeln!(
            out,
            "{PREFIX}_component_memory_usage_bytes{{name=\"{}\",type=\"{}\"}} {}",
            escape_label(&component.name),
            escape_label(&component.kind),
            component.memory_estimate
        );
    }

    gauge_header(
        &mut out,
        "component_initialized",
        "1 when the component holds a live instance",
    );
    for component in &dashboard.components {
        let _ = writeln!(
            out,
            "{PREFIX}_component_initialized{{name=\"{}\"}} {}",
            escape_label(&component.name),
            u8::from(component.is_initialized())
        );
    }

    gauge_header(
        &mut out,
        "component_in_use",
        "1 while any caller holds a lease on the component",
    );
    for component in &dashboard.components {
        let _ = writeln!(
            out,
            "{PREFIX}_component_in_use{{name=\"{}\"}} {}",
            escape_label(&component.name),
            u8::from(component.in_use)
        );
    }

    gauge_header(
        &mut out,
        "component_idle_time_seconds",
        "Seconds since the component was last accessed",
    );
    for component in &dashboard.components {
        let _ = writeln!(
            out,
            "{PREFIX}_component_idle_time_seconds{{name=\"{}\"}} {:.3}",
            escape_label(&component.name),
            component.idle_seconds
        );
    }

    out
}

fn gauge_header(out: &mut String, metric: &str, help: &str) {
    let _ = writeln!(out, "# HELP {PREFIX}_{metric} {help}");
    let _ = writeln!(out, "# TYPE {PREFIX}_{metric} gauge");
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
