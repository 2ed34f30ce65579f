//! Output formatting for the member-forward CLI
//!
//! Human-readable text for the terminal; JSON shapes for `--json`.

use forward_core::ActivationReport;
use serde::Serialize;

use crate::demo::{CallRecord, DeclarationInfo};

/// What `demo --json` prints.
#[derive(Debug, Serialize)]
pub struct DemoOutput<'a> {
    pub report: &'a ActivationReport,
    pub calls: &'a [CallRecord],
}

/// What `inspect --json` prints.
#[derive(Debug, Serialize)]
pub struct InspectOutput<'a> {
    pub group: &'a str,
    pub declarations: &'a [DeclarationInfo],
}

pub fn format_report(report: &ActivationReport) -> String {
    let mut out = format!(
        "Group {}: {} type(s) scanned, {} installed, {} skipped\n",
        report.group,
        report.types_scanned,
        report.installed_count(),
        report.skipped_count()
    );
    for item in &report.installed {
        out.push_str(&format!(
            "  + {} [{}] -> {} ({:?})\n",
            item.key, item.shape, item.target, item.convention
        ));
    }
    for key in &report.skipped {
        out.push_str(&format!("  = {} (already active)\n", key));
    }
    out
}

pub fn format_calls(calls: &[CallRecord]) -> String {
    let mut out = String::from("Calls:\n");
    for call in calls {
        out.push_str(&format!("  {} => {}\n", call.call, call.result));
    }
    out
}

pub fn format_declarations(declarations: &[DeclarationInfo], verbose: bool) -> String {
    if declarations.is_empty() {
        return "No forward declarations\n".to_string();
    }
    let mut out = String::new();
    for decl in declarations {
        out.push_str(&format!("{}\n", decl.key));
        out.push_str(&format!("  kind:       {}\n", decl.kind));
        out.push_str(&format!("  target:     {}\n", decl.target));
        out.push_str(&format!("  convention: {}\n", decl.convention));
        if let Some(source) = &decl.receiver_source {
            out.push_str(&format!("  receiver:   {}\n", source));
        }
        out.push_str(&format!(
            "  group:      {}{}\n",
            decl.group,
            if decl.activated { "" } else { " (inactive)" }
        ));
        if verbose {
            for routine in &decl.routines {
                out.push_str(&format!("  routine {}:\n", routine.stub));
                for line in &routine.listing {
                    out.push_str(&format!("    {}\n", line));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::RoutineInfo;

    fn declaration() -> DeclarationInfo {
        DeclarationInfo {
            key: "M:M.Program.PatchMethod".into(),
            kind: "method",
            target: "M.B.ForwardMethod".into(),
            convention: "ReceiverInjected".into(),
            receiver_source: Some("M.Program.Instance".into()),
            group: "demo".into(),
            activated: true,
            routines: vec![RoutineInfo {
                stub: "M.Program.PatchMethod".into(),
                listing: vec!["ret".into()],
            }],
        }
    }

    #[test]
    fn test_empty_report() {
        let report = ActivationReport {
            group: "g".into(),
            ..ActivationReport::default()
        };
        assert_eq!(
            format_report(&report),
            "Group g: 0 type(s) scanned, 0 installed, 0 skipped\n"
        );
    }

    #[test]
    fn test_listing_only_when_verbose() {
        let decls = vec![declaration()];
        let quiet = format_declarations(&decls, false);
        assert!(quiet.contains("receiver:   M.Program.Instance"));
        assert!(!quiet.contains("routine"));
        let verbose = format_declarations(&decls, true);
        assert!(verbose.contains("routine M.Program.PatchMethod:\n    ret\n"));
    }

    #[test]
    fn test_no_declarations() {
        assert_eq!(format_declarations(&[], true), "No forward declarations\n");
    }
}
