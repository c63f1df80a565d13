//! ICS parsing using the icalendar crate's parser.

use icalendar::parser::{Component, read_calendar, unfold};

use super::{NativeComponent, NativeProperty};
use crate::error::{CalDavError, CalDavResult};

/// Parse ICS content into the components nested in its VCALENDAR.
pub fn parse_ics(content: &str) -> CalDavResult<Vec<NativeComponent>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| CalDavError::IcsParse(e.to_string()))?;

    Ok(calendar.components.iter().map(to_native).collect())
}

fn to_native(component: &Component) -> NativeComponent {
    NativeComponent {
        name: component.name.to_string(),
        properties: component
            .properties
            .iter()
            .map(|prop| NativeProperty {
                name: prop.name.to_string(),
                params: prop
                    .params
                    .iter()
                    .map(|param| {
                        (
                            param.key.to_string(),
                            param
                                .val
                                .as_ref()
                                .map(|v| v.as_ref().trim_matches('"').to_string())
                                .unwrap_or_default(),
                        )
                    })
                    .collect(),
                value: prop.val.to_string(),
            })
            .collect(),
        components: component.components.iter().map(to_native).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_walks_nested_components() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VTODO\r\n\
UID:todo-1\r\n\
SUMMARY:Buy milk\r\n\
DUE;TZID=Europe/Berlin:20250102T100000\r\n\
BEGIN:VALARM\r\n\
ACTION:DISPLAY\r\n\
TRIGGER:-PT15M\r\n\
END:VALARM\r\n\
END:VTODO\r\n\
END:VCALENDAR\r\n";

        let components = parse_ics(ics).expect("Should parse");
        let todo = components
            .iter()
            .find(|c| c.name == "VTODO")
            .expect("Should have VTODO");

        assert_eq!(todo.text("SUMMARY").as_deref(), Some("Buy milk"));
        assert_eq!(
            todo.property("DUE").and_then(|p| p.param("TZID")),
            Some("Europe/Berlin")
        );
        assert_eq!(todo.components.len(), 1);
        assert_eq!(todo.components[0].name, "VALARM");
    }

    #[test]
    fn test_parse_unfolds_long_lines() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VJOURNAL\r\n\
UID:j-1\r\n\
DESCRIPTION:Hello \r\n world and \r\n more text\r\n\
END:VJOURNAL\r\n\
END:VCALENDAR\r\n";

        let components = parse_ics(ics).expect("Should parse");
        assert_eq!(
            components[0].text("DESCRIPTION").as_deref(),
            Some("Hello world and more text")
        );
    }
}
