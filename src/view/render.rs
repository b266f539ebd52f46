//! Overlay composition
//!
//! [`compose`] turns the resolved configuration, the latest status and the
//! current camera URL into an [`OverlayFrame`]: a plain view model listing
//! what is visible, in display order. [`OverlayFrame::to_html`] renders it as
//! a self-contained page suitable for a browser source; [`OverlayFrame::summary`]
//! renders a single text line for logs.
//!
//! Panel order is fixed: camera background, printer name, file name, status,
//! progress bar, layers/ETA row, idle/offline line. Progress, layers and ETA
//! only appear while the printer is running or paused.

use chrono::{DateTime, TimeZone};
use std::fmt::Write as _;

use super::config::{OverlayConfig, OverlayField, SizeStyle};
use super::format;
use crate::settings::BrandingSettings;
use crate::status::PrinterStatus;

/// Everything a frame needs besides config and status
#[derive(Debug, Clone, Default)]
pub struct FrameContext {
    /// Printer display name from the directory, if it could be fetched
    pub printer_name: Option<String>,
    /// Current stream URL; `None` when the camera is hidden
    pub camera_url: Option<String>,
    /// Corner logo settings
    pub branding: BrandingSettings,
}

/// Corner logo link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoLink {
    /// Logo image URL
    pub src: String,
    /// Link target
    pub href: String,
}

/// Arrival estimate shown in the layers/ETA row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtaText {
    /// Remaining time, e.g. `1h 30m`
    pub remaining: String,
    /// Clock time of arrival, e.g. `Tomorrow 00:15`
    pub arrival: String,
}

/// One line of the status panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelLine {
    /// Printer display name
    PrinterName(String),
    /// File name with job suffixes stripped
    Filename(String),
    /// Status label
    Status(String),
    /// Progress bar
    Progress {
        /// Whole percent, 0..=100
        percent: u8,
    },
    /// Either part may be absent, but not both
    LayersEta {
        /// `current/total` layer text
        layers: Option<String>,
        /// Remaining time and arrival clock
        eta: Option<EtaText>,
    },
    /// Connected but not printing
    Idle,
    /// Not connected
    Offline,
}

/// Status panel over the camera background
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelFrame {
    /// Size-dependent dimensions
    pub style: SizeStyle,
    /// Camera background URL; `None` when hidden
    pub camera_url: Option<String>,
    /// Corner logo
    pub logo: LogoLink,
    /// Panel lines in display order
    pub lines: Vec<PanelLine>,
}

/// What the overlay shows right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayFrame {
    /// Terminal state for ids that cannot name a printer
    InvalidPrinter,
    /// Status not loaded yet
    Loading,
    /// Camera and status panel
    Panel(PanelFrame),
}

/// Compose a frame from the current inputs
///
/// `status` is `None` until the first poll or push arrives, which yields
/// [`OverlayFrame::Loading`].
pub fn compose<Tz: TimeZone>(
    config: &OverlayConfig,
    status: Option<&PrinterStatus>,
    context: &FrameContext,
    now: &DateTime<Tz>,
) -> OverlayFrame
where
    Tz::Offset: std::fmt::Display,
{
    let Some(status) = status else {
        return OverlayFrame::Loading;
    };

    let printing = status.is_printing();
    let mut lines = Vec::new();

    if config.shows(OverlayField::Printer) {
        if let Some(name) = context.printer_name.as_deref().filter(|n| !n.is_empty()) {
            lines.push(PanelLine::PrinterName(name.to_string()));
        }
    }

    if config.shows(OverlayField::Filename) {
        if let Some(file) = status.current_print.as_deref().filter(|f| !f.is_empty()) {
            lines.push(PanelLine::Filename(
                format::display_filename(file).to_string(),
            ));
        }
    }

    if config.shows(OverlayField::Status) {
        lines.push(PanelLine::Status(format::status_label(status)));
    }

    if printing {
        if config.shows(OverlayField::Progress) {
            lines.push(PanelLine::Progress {
                percent: format::progress_percent(status.progress),
            });
        }

        let layers = status
            .layer_num
            .filter(|_| config.shows(OverlayField::Layers))
            .map(|layer| format::layers(layer, status.total_layers));
        let eta = status
            .remaining_time
            .filter(|minutes| *minutes > 0 && config.shows(OverlayField::Eta))
            .map(|minutes| EtaText {
                remaining: format::duration(minutes),
                arrival: format::eta(minutes, now),
            });
        if layers.is_some() || eta.is_some() {
            lines.push(PanelLine::LayersEta { layers, eta });
        }
    } else if status.connected {
        lines.push(PanelLine::Idle);
    } else {
        lines.push(PanelLine::Offline);
    }

    OverlayFrame::Panel(PanelFrame {
        style: config.size.style(),
        camera_url: context.camera_url.clone(),
        logo: LogoLink {
            src: context.branding.logo_url.clone(),
            href: context.branding.logo_href.clone(),
        },
        lines,
    })
}

impl PanelLine {
    fn text(&self) -> String {
        match self {
            PanelLine::PrinterName(name) => name.clone(),
            PanelLine::Filename(file) => file.clone(),
            PanelLine::Status(label) => label.clone(),
            PanelLine::Progress { percent } => format!("{percent}%"),
            PanelLine::LayersEta { layers, eta } => {
                let mut parts = Vec::new();
                if let Some(layers) = layers {
                    parts.push(format!("Layer {layers}"));
                }
                if let Some(eta) = eta {
                    parts.push(format!("{} left, ETA {}", eta.remaining, eta.arrival));
                }
                parts.join(" | ")
            }
            PanelLine::Idle => "Printer is idle".to_string(),
            PanelLine::Offline => "Printer offline".to_string(),
        }
    }
}

impl OverlayFrame {
    /// Single-line description, used for logging
    pub fn summary(&self) -> String {
        match self {
            OverlayFrame::InvalidPrinter => "Invalid printer ID".to_string(),
            OverlayFrame::Loading => "Loading...".to_string(),
            OverlayFrame::Panel(panel) => {
                let mut text = panel
                    .lines
                    .iter()
                    .map(PanelLine::text)
                    .collect::<Vec<_>>()
                    .join(" · ");
                if panel.camera_url.is_none() {
                    text.push_str(" (camera hidden)");
                }
                text
            }
        }
    }

    /// Render the frame as a complete HTML document
    pub fn to_html(&self) -> String {
        let mut html = String::from(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Printer Overlay</title>\n",
        );
        match self {
            OverlayFrame::InvalidPrinter => {
                html.push_str(&base_css(None));
                html.push_str("</head>\n<body>\n<div class=\"message\">Invalid printer ID</div>\n");
            }
            OverlayFrame::Loading => {
                html.push_str(&base_css(None));
                html.push_str("</head>\n<body>\n<div class=\"message\">Loading...</div>\n");
            }
            OverlayFrame::Panel(panel) => {
                html.push_str(&base_css(Some(&panel.style)));
                html.push_str("</head>\n<body>\n");
                render_panel(&mut html, panel);
            }
        }
        html.push_str("</body>\n</html>\n");
        html
    }
}

fn render_panel(html: &mut String, panel: &PanelFrame) {
    if let Some(url) = &panel.camera_url {
        let _ = writeln!(
            html,
            "<img class=\"camera\" src=\"{}\" alt=\"\">",
            escape(url)
        );
    }
    let _ = writeln!(
        html,
        "<a class=\"logo\" href=\"{}\" target=\"_blank\"><img src=\"{}\" alt=\"logo\"></a>",
        escape(&panel.logo.href),
        escape(&panel.logo.src)
    );

    html.push_str("<div class=\"panel\">\n");
    for line in &panel.lines {
        match line {
            PanelLine::PrinterName(name) => {
                let _ = writeln!(html, "<div class=\"printer\">{}</div>", escape(name));
            }
            PanelLine::Filename(file) => {
                let _ = writeln!(html, "<div class=\"filename\">{}</div>", escape(file));
            }
            PanelLine::Status(label) => {
                let _ = writeln!(html, "<div class=\"status\">{}</div>", escape(label));
            }
            PanelLine::Progress { percent } => {
                let _ = writeln!(
                    html,
                    "<div class=\"progress\"><div class=\"bar\" style=\"width: {percent}%\"></div><span>{percent}%</span></div>"
                );
            }
            PanelLine::LayersEta { layers, eta } => {
                html.push_str("<div class=\"row\">");
                if let Some(layers) = layers {
                    let _ = write!(html, "<span class=\"layers\">Layer {}</span>", escape(layers));
                }
                if let Some(eta) = eta {
                    let _ = write!(
                        html,
                        "<span class=\"eta\">{} left &middot; ETA {}</span>",
                        escape(&eta.remaining),
                        escape(&eta.arrival)
                    );
                }
                html.push_str("</div>\n");
            }
            PanelLine::Idle | PanelLine::Offline => {
                let _ = writeln!(html, "<div class=\"idle\">{}</div>", line.text());
            }
        }
    }
    html.push_str("</div>\n");
}

fn base_css(style: Option<&SizeStyle>) -> String {
    let mut css = String::from(
        "<style>\n\
         html, body { margin: 0; height: 100%; background: transparent; overflow: hidden; \
         font-family: system-ui, sans-serif; color: #fff; }\n\
         .message { position: absolute; bottom: 16px; left: 16px; opacity: 0.8; }\n\
         .camera { position: absolute; inset: 0; width: 100%; height: 100%; object-fit: cover; }\n\
         .panel { position: absolute; left: 0; right: 0; bottom: 0; \
         background: linear-gradient(to top, rgba(0,0,0,0.85), rgba(0,0,0,0)); }\n\
         .logo { position: absolute; top: 12px; right: 12px; opacity: 0.8; }\n\
         .progress { position: relative; background: rgba(255,255,255,0.2); border-radius: 999px; overflow: hidden; }\n\
         .progress .bar { height: 100%; background: #00ae42; }\n\
         .progress span { position: absolute; right: 8px; top: 50%; transform: translateY(-50%); font-size: 0.8em; }\n\
         .row { display: flex; gap: 1.5em; opacity: 0.9; }\n\
         .idle { opacity: 0.7; }\n",
    );
    if let Some(style) = style {
        let _ = writeln!(
            css,
            ".panel {{ padding: {pad}px; font-size: {text}px; }}\n\
             .printer, .filename {{ font-size: {title}px; font-weight: 600; }}\n\
             .progress {{ height: {bar}px; margin: 6px 0; }}\n\
             .logo img {{ height: {logo}px; }}",
            pad = style.padding_px,
            text = style.text_px,
            title = style.title_px,
            bar = style.progress_px,
            logo = style.logo_px,
        );
    }
    css.push_str("</style>\n");
    css
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::config::resolve_query;
    use chrono::Utc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 22, 0, 0).unwrap()
    }

    fn printing() -> PrinterStatus {
        PrinterStatus {
            connected: true,
            state: Some("RUNNING".into()),
            progress: 41.6,
            current_print: Some("benchy.gcode.3mf".into()),
            remaining_time: Some(150),
            layer_num: Some(80),
            total_layers: Some(200),
            stg_cur_name: None,
        }
    }

    fn context() -> FrameContext {
        FrameContext {
            printer_name: Some("Voron 2.4".into()),
            camera_url: Some("http://h/cam?t=1".into()),
            branding: BrandingSettings::default(),
        }
    }

    fn lines(frame: OverlayFrame) -> Vec<PanelLine> {
        match frame {
            OverlayFrame::Panel(panel) => panel.lines,
            other => panic!("expected panel, got {other:?}"),
        }
    }

    #[test]
    fn missing_status_is_loading() {
        let config = resolve_query("");
        assert_eq!(compose(&config, None, &context(), &now()), OverlayFrame::Loading);
    }

    #[test]
    fn printing_panel_in_fixed_order() {
        let config = resolve_query("show=printer,filename,status,progress,layers,eta");
        let lines = lines(compose(&config, Some(&printing()), &context(), &now()));
        assert_eq!(
            lines,
            vec![
                PanelLine::PrinterName("Voron 2.4".into()),
                PanelLine::Filename("benchy".into()),
                PanelLine::Status("Printing".into()),
                PanelLine::Progress { percent: 42 },
                PanelLine::LayersEta {
                    layers: Some("80/200".into()),
                    eta: Some(EtaText {
                        remaining: "2h 30m".into(),
                        arrival: "Tomorrow 00:30".into(),
                    }),
                },
            ]
        );
    }

    #[test]
    fn printer_name_is_opt_in() {
        let config = resolve_query("");
        let lines = lines(compose(&config, Some(&printing()), &context(), &now()));
        assert!(!lines.iter().any(|l| matches!(l, PanelLine::PrinterName(_))));
    }

    #[test]
    fn status_line_hidden_without_status_field() {
        let config = resolve_query("show=progress,layers,eta,filename");
        let lines = lines(compose(&config, Some(&printing()), &context(), &now()));
        assert!(!lines.iter().any(|l| matches!(l, PanelLine::Status(_))));
    }

    #[test]
    fn idle_printer_hides_job_fields() {
        let status = PrinterStatus {
            state: Some("IDLE".into()),
            ..printing()
        };
        let config = resolve_query("");
        let lines = lines(compose(&config, Some(&status), &context(), &now()));
        assert!(!lines.iter().any(|l| matches!(
            l,
            PanelLine::Progress { .. } | PanelLine::LayersEta { .. }
        )));
        assert_eq!(lines.last(), Some(&PanelLine::Idle));
    }

    #[test]
    fn disconnected_printer_is_offline() {
        let status = PrinterStatus {
            connected: false,
            state: Some("FINISH".into()),
            ..Default::default()
        };
        let lines = lines(compose(&resolve_query(""), Some(&status), &context(), &now()));
        assert_eq!(lines, vec![PanelLine::Status("Finished".into()), PanelLine::Offline]);
    }

    #[test]
    fn layers_and_eta_are_independent() {
        let only_eta = PrinterStatus {
            layer_num: None,
            ..printing()
        };
        let config = resolve_query("show=layers,eta");
        let lines_eta = lines(compose(&config, Some(&only_eta), &context(), &now()));
        assert!(matches!(
            lines_eta.as_slice(),
            [PanelLine::LayersEta { layers: None, eta: Some(_) }]
        ));

        let config = resolve_query("show=layers");
        let lines_layers = lines(compose(&config, Some(&printing()), &context(), &now()));
        assert!(matches!(
            lines_layers.as_slice(),
            [PanelLine::LayersEta { layers: Some(_), eta: None }]
        ));

        let nothing = PrinterStatus {
            layer_num: None,
            remaining_time: Some(0),
            ..printing()
        };
        let lines_none = lines(compose(&config, Some(&nothing), &context(), &now()));
        assert!(lines_none.is_empty());
    }

    #[test]
    fn hidden_camera_still_renders_panel() {
        let config = resolve_query("camera=false");
        let ctx = FrameContext {
            camera_url: None,
            ..context()
        };
        let frame = compose(&config, Some(&printing()), &ctx, &now());
        let html = frame.to_html();
        assert!(!html.contains("class=\"camera\""));
        assert!(html.contains("class=\"panel\""));
        assert!(frame.summary().ends_with("(camera hidden)"));
    }

    #[test]
    fn html_escapes_status_text() {
        let status = PrinterStatus {
            current_print: Some("<script>x</script>.gcode".into()),
            ..printing()
        };
        let html = compose(&resolve_query(""), Some(&status), &context(), &now()).to_html();
        assert!(html.contains("&lt;script&gt;x&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("src=\"http://h/cam?t=1\""));
        assert!(html.contains("width: 42%"));
    }

    #[test]
    fn terminal_and_loading_pages() {
        assert!(OverlayFrame::InvalidPrinter.to_html().contains("Invalid printer ID"));
        assert!(!OverlayFrame::Loading.to_html().contains("class=\"panel\""));
    }
}
