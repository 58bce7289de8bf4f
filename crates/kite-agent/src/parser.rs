//! Turns raw model text into typed actions

use crate::action::*;
use crate::grammar::{self, TagSpan};

/// Parse every action in `text`, in source order.
///
/// Unknown tags are ignored and a tag missing a required attribute (or
/// carrying a malformed one) is dropped on its own without affecting the
/// rest of the parse.
pub fn parse_actions(text: &str) -> Vec<Action> {
    grammar::action_tags(text)
        .iter()
        .filter_map(action_from_tag)
        .collect()
}

/// Build the action for one complete tag, `None` if it is malformed
pub fn action_from_tag(tag: &TagSpan<'_>) -> Option<Action> {
    let attrs = &tag.attrs;
    let body = tag.body.unwrap_or("");
    let value = |name: &str| attrs.non_empty(name).map(str::to_string);

    let action = match tag.name {
        "bash" => Action::Bash(BashAction {
            command: non_empty_body(body)?,
            timeout_secs: parse_number(attrs.non_empty("timeout"))?,
        }),
        "read" => Action::Read(ReadAction {
            path: value("path")?,
            offset: parse_number(attrs.non_empty("offset"))?,
            limit: parse_number(attrs.non_empty("limit"))?,
        }),
        "edit" => {
            let mut pairs = edit_pairs(body);
            let path = value("path")?;
            match pairs.len() {
                0 => return None,
                1 => {
                    let pair = pairs.remove(0);
                    Action::Edit(EditAction {
                        path,
                        search: pair.search,
                        replace: pair.replace,
                        replace_all: attrs.flag("replace-all"),
                    })
                }
                // Several blocks in one edit behave like a multi-edit
                _ => Action::MultiEdit(MultiEditAction { path, edits: pairs }),
            }
        }
        "multi-edit" => {
            let edits = edit_pairs(body);
            if edits.is_empty() {
                return None;
            }
            Action::MultiEdit(MultiEditAction {
                path: value("path")?,
                edits,
            })
        }
        "write" => Action::Write(WriteAction {
            path: value("path")?,
            content: file_body(body),
        }),
        "create" => Action::Create(CreateAction {
            path: value("path")?,
            content: file_body(body),
        }),
        "glob" => Action::Glob(GlobAction {
            pattern: value("pattern").or_else(|| non_empty_body(body))?,
            path: value("path"),
        }),
        "grep" => Action::Grep(GrepAction {
            pattern: value("pattern").or_else(|| non_empty_body(body))?,
            path: value("path"),
            include: value("include"),
        }),
        "ls" => Action::Ls(LsAction {
            path: value("path").unwrap_or_else(|| ".".to_string()),
        }),
        "git" => Action::Git(GitAction {
            args: non_empty_body(body).or_else(|| value("args"))?,
        }),
        "fetch" => Action::Fetch(FetchAction {
            url: value("url").or_else(|| non_empty_body(body))?,
        }),
        "search" => Action::Search(SearchAction {
            query: value("query")?,
        }),
        "format" => Action::Format(FormatAction {
            path: value("path")?,
        }),
        "typecheck" => Action::Typecheck(TypecheckAction {
            path: value("path"),
        }),
        "schedule" => Action::Schedule(ScheduleAction {
            name: value("name")?,
            cron: value("cron")?,
            task: non_empty_body(body)?,
        }),
        "notify" => Action::Notify(NotifyAction {
            message: non_empty_body(body).or_else(|| value("message"))?,
            target: value("target"),
        }),
        "skill" => Action::Skill(SkillAction {
            name: value("name")?,
        }),
        "skill-install" => Action::SkillInstall(SkillInstallAction {
            source: value("source")?,
        }),
        "plan" => Action::Plan(PlanAction {
            plan: non_empty_body(body)?,
        }),
        "task" => Action::Task(TaskAction {
            description: value("description")?,
            prompt: non_empty_body(body)?,
        }),
        "explore" => Action::Explore(ExploreAction {
            query: non_empty_body(body).or_else(|| value("query"))?,
        }),
        "ps" => Action::Ps,
        "kill" => Action::Kill(KillAction {
            pid: attrs.non_empty("pid")?.parse().ok()?,
        }),
        "connector-config" => Action::ConnectorConfig(ConnectorConfigAction {
            platform: value("platform")?,
            key: value("key")?,
            value: attrs.get("value")?.to_string(),
        }),
        _ => return None,
    };
    Some(action)
}

/// Parse an optional numeric attribute. A present but malformed value
/// yields `None` so the whole action is dropped.
fn parse_number<T: std::str::FromStr>(value: Option<&str>) -> Option<Option<T>> {
    match value {
        None => Some(None),
        Some(v) => v.parse().ok().map(Some),
    }
}

fn non_empty_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// File content keeps its trailing newline but drops the newline that
/// follows the open tag.
fn file_body(body: &str) -> String {
    strip_leading_newline(body).to_string()
}

fn strip_leading_newline(text: &str) -> &str {
    text.strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text)
}

fn strip_trailing_newline(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// Search/replace blocks are written on their own lines, so one newline on
/// each side of the inner text belongs to the markup.
fn block_text(text: &str) -> String {
    strip_trailing_newline(strip_leading_newline(text)).to_string()
}

/// Extract `<search>..</search><replace>..</replace>` pairs in order. A
/// search without a following replace ends the scan.
fn edit_pairs(body: &str) -> Vec<EditPair> {
    let mut pairs = Vec::new();
    let mut rest = body;
    while let Some((search, after_search)) = child_element(rest, "search") {
        let Some((replace, after_replace)) = child_element(after_search, "replace") else {
            break;
        };
        pairs.push(EditPair {
            search: block_text(search),
            replace: block_text(replace),
        });
        rest = after_replace;
    }
    pairs
}

/// Find the first `<name>inner</name>` and return `(inner, rest_after)`
fn child_element<'a>(text: &'a str, name: &str) -> Option<(&'a str, &'a str)> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = text.find(&open)? + open.len();
    let end = start + text[start..].find(&close)?;
    Some((&text[start..end], &text[end + close.len()..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_in_prose() {
        let actions = parse_actions("I'll fix it now.\n<read path=\"a.ts\"/>");
        assert_eq!(
            actions,
            vec![Action::Read(ReadAction {
                path: "a.ts".into(),
                offset: None,
                limit: None,
            })]
        );
    }

    #[test]
    fn test_paired_and_self_closing_read() {
        let actions = parse_actions(
            r#"<read path="a" offset="3" limit="10"></read><read limit='2' path='b'/>"#,
        );
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0],
            Action::Read(ReadAction {
                path: "a".into(),
                offset: Some(3),
                limit: Some(10),
            })
        );
        assert_eq!(actions[1].label(), "read b (first 2 lines)");
    }

    #[test]
    fn test_missing_required_attribute_drops_only_that_action() {
        let text = r#"<edit><search>a</search><replace>b</replace></edit>
<bash>ls</bash>"#;
        let actions = parse_actions(text);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind(), "bash");
    }

    #[test]
    fn test_malformed_number_drops_action() {
        assert!(parse_actions(r#"<read path="a" limit="ten"/>"#).is_empty());
        assert!(parse_actions(r#"<kill pid="-1"/>"#).is_empty());
    }

    #[test]
    fn test_edit_block() {
        let text = "<edit path=\"src/lib.rs\">\n<search>\nfn old() {}\n</search>\n<replace>\nfn new() {}\n</replace>\n</edit>";
        let actions = parse_actions(text);
        assert_eq!(
            actions,
            vec![Action::Edit(EditAction {
                path: "src/lib.rs".into(),
                search: "fn old() {}".into(),
                replace: "fn new() {}".into(),
                replace_all: false,
            })]
        );
    }

    #[test]
    fn test_edit_empty_replace_deletes() {
        let actions = parse_actions(
            r#"<edit path="a" replace-all><search>x</search><replace></replace></edit>"#,
        );
        match &actions[0] {
            Action::Edit(edit) => {
                assert_eq!(edit.replace, "");
                assert!(edit.replace_all);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_multi_edit_pairs_in_order() {
        let text = r#"<multi-edit path="a.rs">
<search>one</search>
<replace>1</replace>
<search>two</search>
<replace>2</replace>
</multi-edit>"#;
        match &parse_actions(text)[0] {
            Action::MultiEdit(m) => {
                assert_eq!(m.edits.len(), 2);
                assert_eq!(m.edits[1].search, "two");
                assert_eq!(m.edits[1].replace, "2");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_write_keeps_trailing_newline() {
        let actions = parse_actions("<write path=\"a.txt\">\nhello\nworld\n</write>");
        assert_eq!(
            actions,
            vec![Action::Write(WriteAction {
                path: "a.txt".into(),
                content: "hello\nworld\n".into(),
            })]
        );
    }

    #[test]
    fn test_write_body_may_contain_markup() {
        let text = "<write path=\"index.html\">\n<div><b>hi</b></div>\n</write>";
        match &parse_actions(text)[0] {
            Action::Write(w) => assert_eq!(w.content, "<div><b>hi</b></div>\n"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_top_level_search_needs_query() {
        assert!(parse_actions("<search>rust async</search>").is_empty());
        assert_eq!(
            parse_actions(r#"<search query="rust async"/>"#),
            vec![Action::Search(SearchAction {
                query: "rust async".into()
            })]
        );
    }

    #[test]
    fn test_unknown_and_unterminated_tags_ignored() {
        let actions = parse_actions("<thinking>hm</thinking><bash>ls");
        assert!(actions.is_empty());
    }

    #[test]
    fn test_source_order_preserved() {
        let text = r#"<ls path="src"/> then <bash>cargo build</bash> then <glob pattern="**/*.rs"/> <ps/>"#;
        let kinds: Vec<_> = parse_actions(text).iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec!["ls", "bash", "glob", "ps"]);
    }

    #[test]
    fn test_misc_actions() {
        let text = r#"<task description="audit">Check every unsafe block</task>
<notify target="ops">Build finished</notify>
<schedule name="nightly" cron="0 3 * * *">run the tests</schedule>
<connector-config platform="telegram" key="chat_id" value="42"/>
<git>status --short</git>"#;
        let actions = parse_actions(text);
        assert_eq!(actions.len(), 5);
        assert_eq!(
            actions[0],
            Action::Task(TaskAction {
                description: "audit".into(),
                prompt: "Check every unsafe block".into(),
            })
        );
        assert_eq!(
            actions[4],
            Action::Git(GitAction {
                args: "status --short".into()
            })
        );
    }
}
