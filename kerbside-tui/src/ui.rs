use chrono::{DateTime, Local, Utc};
use kerbside_core::{BinId, BinStatus, CollectionStatus, RouteStatus};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Tabs, Wrap},
};

use crate::app::{App, Screen};

pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.area();

    // Outer layout: tabs, main content, status line
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [header_area, content_area, status_area] = chunks else {
        return;
    };

    let tabs = Tabs::new(Screen::ALL.iter().map(|screen| screen.title()))
        .select(app.screen.position())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Kerbside · acting as {}", app.cast.operator.id)),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, *header_area);

    match app.screen {
        Screen::Bins => draw_bins(frame, app, *content_area),
        Screen::Nearby => draw_nearby(frame, app, *content_area),
        Screen::Collections => draw_collections(frame, app, *content_area),
        Screen::Routes => draw_routes(frame, app, *content_area),
        Screen::Dashboard => draw_dashboard(frame, app, *content_area),
    }

    let nav_hint = match app.screen {
        Screen::Bins | Screen::Nearby => {
            "Tab/← → switch · ↑/↓ move · d dispose · p request pickup · m maintenance · r refresh · q quit"
        }
        Screen::Collections => "Tab/← → switch · ↑/↓ move · Enter advance · r refresh · q quit",
        Screen::Routes => {
            "Tab/← → switch · ↑/↓ move · a schedule · s start · c complete · r refresh · q quit"
        }
        Screen::Dashboard => "Tab/← → switch · r refresh · q quit",
    };

    let status_text = if app.is_loading {
        format!("Working… · {nav_hint}")
    } else if let Some(msg) = app.error_message.as_ref().or(app.notice.as_ref()) {
        format!("{msg} · {nav_hint}")
    } else {
        nav_hint.to_owned()
    };

    let status_style = if app.error_message.is_some() {
        Style::default().fg(Color::Red)
    } else if app.is_loading {
        Style::default().fg(Color::Yellow)
    } else if app.notice.is_some() {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };

    let status = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(status_style)
        .wrap(Wrap { trim: true });

    frame.render_widget(status, *status_area);
}

fn render_rows(
    frame: &mut Frame<'_>,
    app: &App,
    area: Rect,
    header: Vec<&'static str>,
    widths: Vec<Constraint>,
    rows: Vec<Row<'_>>,
) {
    let empty = rows.is_empty();
    let table = Table::new(rows, widths)
        .header(Row::new(header).style(Style::default().add_modifier(Modifier::BOLD)))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(app.screen.title()),
        )
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .column_spacing(1);

    let mut state = TableState::default();
    if !empty {
        state.select(Some(app.list_index));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn draw_bins(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let rows = app
        .bins
        .iter()
        .map(|bin| {
            Row::new(vec![
                Cell::from(bin.location.name.clone()),
                Cell::from(bin.category.to_string()),
                Cell::from(format!("{:>3}%", bin.fill_level)),
                Cell::from(bin.status.to_string()),
                Cell::from(
                    bin.assigned_collector
                        .as_ref()
                        .map_or_else(|| "-".to_owned(), ToString::to_string),
                ),
                Cell::from(bin.code.clone()),
            ])
            .style(Style::default().fg(bin_color(bin.status)))
        })
        .collect();

    render_rows(
        frame,
        app,
        area,
        vec!["Name", "Category", "Fill", "Status", "Collector", "Code"],
        vec![
            Constraint::Min(18),
            Constraint::Length(11),
            Constraint::Length(5),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Min(24),
        ],
        rows,
    );
}

fn draw_nearby(frame: &mut Frame<'_>, app: &App, area: Rect) {
    if app.nearby.is_empty() {
        let paragraph = Paragraph::new(format!(
            "No active bins within {:.1} km of {:.4}, {:.4}.",
            app.home.radius(),
            app.home.origin.latitude,
            app.home.origin.longitude
        ))
        .block(Block::default().borders(Borders::ALL).title("Nearby"))
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
        return;
    }

    let rows = app
        .nearby
        .iter()
        .map(|hit| {
            Row::new(vec![
                Cell::from(format!("{:.2} km", hit.distance_km)),
                Cell::from(hit.bin.location.name.clone()),
                Cell::from(format!("{:>3}%", hit.bin.fill_level)),
                Cell::from(hit.bin.status.to_string()),
            ])
            .style(Style::default().fg(bin_color(hit.bin.status)))
        })
        .collect();

    render_rows(
        frame,
        app,
        area,
        vec!["Distance", "Name", "Fill", "Status"],
        vec![
            Constraint::Length(9),
            Constraint::Min(18),
            Constraint::Length(5),
            Constraint::Length(12),
        ],
        rows,
    );
}

fn draw_collections(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let bin_names = |id: &BinId| {
        app.bins
            .iter()
            .find(|bin| bin.id == *id)
            .map_or_else(|| String::from("?"), |bin| bin.location.name.clone())
    };
    let rows = app
        .collections
        .iter()
        .map(|collection| {
            let style = match collection.status {
                CollectionStatus::Assigned => Style::default(),
                CollectionStatus::InProgress => Style::default().fg(Color::Yellow),
                CollectionStatus::Completed => Style::default().fg(Color::Green),
                CollectionStatus::Cancelled => Style::default().fg(Color::DarkGray),
            };
            Row::new(vec![
                Cell::from(bin_names(&collection.bin)),
                Cell::from(collection.kind.to_string()),
                Cell::from(collection.status.to_string()),
                Cell::from(local_time(collection.scheduled_at)),
                Cell::from(
                    collection
                        .rating
                        .map_or_else(String::new, |stars| "*".repeat(usize::from(stars))),
                ),
                Cell::from(collection.id.to_string()),
            ])
            .style(style)
        })
        .collect();

    render_rows(
        frame,
        app,
        area,
        vec!["Bin", "Kind", "Status", "Scheduled", "Rating", "Id"],
        vec![
            Constraint::Min(18),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(6),
            Constraint::Min(20),
        ],
        rows,
    );
}

fn draw_routes(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let rows = app
        .routes
        .iter()
        .map(|view| {
            let mut style = Style::default().fg(route_color(view.route.status));
            if view.overdue {
                style = style.add_modifier(Modifier::BOLD);
            }
            Row::new(vec![
                Cell::from(view.route.name.clone()),
                Cell::from(view.route.status.to_string()),
                Cell::from(format!("{:>3}%", view.progress)),
                Cell::from(format!(
                    "{}/{}",
                    view.route.completed_bins.len(),
                    view.route.stops.len()
                )),
                Cell::from(local_time(view.route.scheduled_at)),
                Cell::from(local_time(view.estimated_completion)),
                Cell::from(format!("{:.1} km", view.route.planned_distance_km)),
            ])
            .style(style)
        })
        .collect();

    render_rows(
        frame,
        app,
        area,
        vec!["Name", "Status", "Done", "Stops", "Scheduled", "ETA", "Distance"],
        vec![
            Constraint::Min(20),
            Constraint::Length(12),
            Constraint::Length(5),
            Constraint::Length(6),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(9),
        ],
        rows,
    );
}

fn draw_dashboard(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title("Dashboard");
    let Some(dashboard) = &app.dashboard else {
        let paragraph = Paragraph::new("Press r to load the dashboard.").block(block);
        frame.render_widget(paragraph, area);
        return;
    };

    let mut lines = vec![
        Line::from(format!(
            "Bins: {} total, {} active, {} need collection",
            dashboard.total_bins, dashboard.active_bins, dashboard.bins_needing_collection
        )),
        Line::from(format!("Collections today: {}", dashboard.collections_today)),
        Line::from(format!(
            "Revenue today: {:.2} from {} payments",
            dashboard.revenue_today.amount, dashboard.revenue_today.count
        )),
        Line::from(format!(
            "Average completion: {}",
            dashboard
                .average_completion_minutes
                .map_or_else(|| "n/a".to_owned(), |minutes| format!("{minutes:.0} min"))
        )),
        Line::from(format!("Users: {}", dashboard.total_users)),
    ];
    lines.extend(dashboard.users_by_role.iter().map(|(role, count)| {
        Line::from(format!(
            "  {role}: {} ({} active)",
            count.count, count.active
        ))
    }));

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%d.%m %H:%M").to_string()
}

fn bin_color(status: BinStatus) -> Color {
    match status {
        BinStatus::Empty => Color::Gray,
        BinStatus::Partial => Color::Green,
        BinStatus::Full => Color::Yellow,
        BinStatus::Overflowing => Color::Red,
        BinStatus::Maintenance => Color::Magenta,
    }
}

fn route_color(status: RouteStatus) -> Color {
    match status {
        RouteStatus::Active => Color::Cyan,
        RouteStatus::InProgress => Color::Yellow,
        RouteStatus::Completed => Color::Green,
        RouteStatus::Paused => Color::Magenta,
        RouteStatus::Cancelled => Color::DarkGray,
    }
}
