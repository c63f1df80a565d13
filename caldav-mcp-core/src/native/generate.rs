//! ICS generation through the icalendar crate's renderer.
//!
//! Native components are handed over as parsed components, so component names
//! the crate has no type for (VJOURNAL, VALARM, VTIMEZONE) render the same way
//! as events and to-dos. TEXT escaping, parameter quoting and line folding are
//! the renderer's.

use icalendar::parser::{Component, Parameter, Property};
use icalendar::{Calendar, CalendarComponent};

use super::NativeComponent;

pub const PRODID: &str = "-//caldav-mcp//EN";

/// Wrap components in a VCALENDAR document.
pub fn generate_ics(components: &[NativeComponent]) -> String {
    let mut calendar = Calendar::empty();
    calendar.append_property(("VERSION", "2.0"));
    calendar.append_property(("PRODID", PRODID));
    calendar.extend(components.iter().map(to_calendar_component));
    drop_injected(&calendar.to_string(), components)
}

/// Render one component on its own, without the VCALENDAR wrapper.
pub fn render_component(component: &NativeComponent) -> String {
    let mut calendar = Calendar::empty();
    calendar.push(to_calendar_component(component));
    let rendered = drop_injected(&calendar.to_string(), std::slice::from_ref(component));
    rendered
        .strip_prefix("BEGIN:VCALENDAR\r\n")
        .and_then(|body| body.strip_suffix("END:VCALENDAR\r\n"))
        .map(str::to_string)
        .unwrap_or(rendered)
}

fn to_calendar_component(component: &NativeComponent) -> CalendarComponent {
    CalendarComponent::from(to_parsed(component))
}

fn to_parsed(component: &NativeComponent) -> Component<'static> {
    Component {
        name: component.name.to_ascii_uppercase().into(),
        properties: component
            .properties
            .iter()
            .map(|prop| Property {
                name: prop.name.to_ascii_uppercase().into(),
                val: prop.value.clone().into(),
                params: prop
                    .params
                    .iter()
                    .map(|(key, value)| Parameter {
                        key: key.to_ascii_uppercase().into(),
                        val: Some(value.clone().into()),
                    })
                    .collect(),
            })
            .collect(),
        components: component.components.iter().map(to_parsed).collect(),
    }
}

/// The renderer adds DTSTAMP and UID to every component lacking them, nested
/// alarms and time zones included. Remove the ones the record did not carry.
fn drop_injected(rendered: &str, components: &[NativeComponent]) -> String {
    let mut carried = Vec::new();
    collect_carried(components, &mut carried);
    let mut carried = carried.into_iter();

    let mut open: Vec<(bool, bool)> = Vec::new();
    let mut out = String::with_capacity(rendered.len());
    for line in rendered.split_inclusive("\r\n") {
        let content = line.trim_end_matches("\r\n");
        if let Some(name) = content.strip_prefix("BEGIN:") {
            if name != "VCALENDAR" {
                open.push(carried.next().unwrap_or((true, true)));
            }
        } else if let Some(name) = content.strip_prefix("END:") {
            if name != "VCALENDAR" {
                open.pop();
            }
        } else if let Some(&(has_dtstamp, has_uid)) = open.last() {
            if (!has_dtstamp && content.starts_with("DTSTAMP:"))
                || (!has_uid && content.starts_with("UID:"))
            {
                continue;
            }
        }
        out.push_str(line);
    }
    out
}

/// DTSTAMP/UID presence per component, in rendering order.
fn collect_carried(components: &[NativeComponent], out: &mut Vec<(bool, bool)>) {
    for component in components {
        out.push((
            component.property("DTSTAMP").is_some(),
            component.property("UID").is_some(),
        ));
        collect_carried(&component.components, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{NativeProperty, parse_ics};

    #[test]
    fn test_generate_wraps_in_vcalendar() {
        let mut event = NativeComponent::new("VEVENT");
        event.push(NativeProperty::new("UID", "abc"));
        event.push(NativeProperty::new("SUMMARY", "Standup"));

        let ics = generate_ics(&[event]);
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"), "got {ics}");
        assert!(ics.contains("VERSION:2.0\r\n"));
        assert!(ics.contains(&format!("PRODID:{}\r\n", PRODID)));
        assert!(ics.contains("BEGIN:VEVENT\r\n"));
        assert!(ics.contains("UID:abc\r\n"));
        assert!(ics.contains("SUMMARY:Standup\r\n"));
        assert!(ics.ends_with("END:VEVENT\r\nEND:VCALENDAR\r\n"));
        assert!(!ics.contains("DTSTAMP"), "no stamp the record did not carry");
    }

    #[test]
    fn test_nested_components_get_no_extra_uid() {
        let mut alarm = NativeComponent::new("VALARM");
        alarm.push(NativeProperty::new("ACTION", "DISPLAY"));
        alarm.push(NativeProperty::new("TRIGGER", "-PT15M"));
        let mut todo = NativeComponent::new("VTODO");
        todo.push(NativeProperty::new("UID", "todo-1"));
        todo.push(NativeProperty::new("DTSTAMP", "20250101T000000Z"));
        todo.components.push(alarm);

        let ics = generate_ics(&[todo]);
        assert_eq!(ics.matches("UID:").count(), 1, "got {ics}");
        assert!(ics.contains("DTSTAMP:20250101T000000Z\r\n"));
        assert_eq!(ics.matches("DTSTAMP:").count(), 1);

        let parsed = parse_ics(&ics).expect("Should parse");
        assert_eq!(parsed[0].components[0].name, "VALARM");
        assert_eq!(parsed[0].components[0].text("TRIGGER").as_deref(), Some("-PT15M"));
    }

    #[test]
    fn test_text_values_escape_and_parse_back() {
        let summary = "Plan: a, b; c\nnext line \\ done";
        let mut journal = NativeComponent::new("VJOURNAL");
        journal.push(NativeProperty::new("UID", "j"));
        journal.push(NativeProperty::new("SUMMARY", summary));

        let ics = generate_ics(&[journal]);
        assert!(
            ics.contains("SUMMARY:Plan: a\\, b\\; c\\nnext line \\\\ done\r\n"),
            "got {ics}"
        );

        let parsed = parse_ics(&ics).expect("Should parse");
        assert_eq!(parsed[0].name, "VJOURNAL");
        assert_eq!(parsed[0].text("SUMMARY").as_deref(), Some(summary));
    }

    #[test]
    fn test_long_lines_fold_within_limit_and_parse_back() {
        let description = "é".repeat(60) + " and some trailing ascii text to push past the limit";
        let mut journal = NativeComponent::new("VJOURNAL");
        journal.push(NativeProperty::new("UID", "j"));
        journal.push(NativeProperty::new("DESCRIPTION", description.as_str()));

        let ics = generate_ics(&[journal]);
        for line in ics.split("\r\n") {
            assert!(line.len() <= 75, "line too long: {} octets", line.len());
        }

        let parsed = parse_ics(&ics).expect("Should parse");
        assert_eq!(parsed[0].text("DESCRIPTION"), Some(description));
    }

    #[test]
    fn test_params_with_separators_are_quoted() {
        let mut event = NativeComponent::new("VEVENT");
        event.push(NativeProperty::new("UID", "e"));
        event.push(NativeProperty::new("ATTENDEE", "mailto:a@x.org").with_param("CN", "Doe, Jane"));

        let ics = render_component(&event);
        assert!(ics.starts_with("BEGIN:VEVENT\r\n"), "got {ics}");
        assert!(ics.contains("ATTENDEE;CN=\"Doe, Jane\":mailto:a@x.org\r\n"), "got {ics}");
        assert!(ics.ends_with("END:VEVENT\r\n"));
    }
}
