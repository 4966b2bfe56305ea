//! Role dispatcher: the decision core.
//!
//! Role, data visibility and side effect are decided together here, from a
//! single table keyed by role. Adding a role means adding a row to
//! `BEHAVIORS`, not another branch.

use serde_json::json;
use tracing::debug;

use crate::error::AuthorizationError;
use crate::pipeline::command::{Command, Request};
use crate::pipeline::normalize::InboundMessage;
use crate::table::{BotCatalog, EntityCatalog, Role};

/// Substring a bot's task must contain to be forwarded.
pub const ROBOT_CONTROL_MARKER: &str = "robot";

/// The only task a lead may run.
pub const LEAD_TASK: &str = "info";

/// Subject of an infodump reply.
pub const INFODUMP_SUBJECT: &str = "info";

/// An outbound message before MIME composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Side effect chosen by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Answer the sender.
    Reply(Response),
    /// Alert the operator on the sender's behalf.
    Forward(Response),
}

impl Action {
    pub fn response(&self) -> &Response {
        match self {
            Self::Reply(r) | Self::Forward(r) => r,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Reply(_) => "reply",
            Self::Forward(_) => "forward",
        }
    }
}

/// A successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    /// Whether answering this request starts the sender's cooldown.
    pub consumes_cooldown: bool,
}

/// Everything a handler may look at.
struct Context<'a> {
    sender: &'a str,
    subject: &'a str,
    operator: &'a str,
    bots: &'a BotCatalog,
    entities: &'a EntityCatalog,
}

type CommandHandler = fn(&Context<'_>, &Command) -> Option<Action>;
type InfoDumpHandler = fn(&Context<'_>) -> Action;

/// One row of the dispatch table.
struct RoleBehavior {
    role: Role,
    command: CommandHandler,
    infodump: Option<InfoDumpHandler>,
}

static BEHAVIORS: [RoleBehavior; 3] = [
    RoleBehavior {
        role: Role::Bot,
        command: forward_robot_control,
        infodump: Some(dump_bot_catalog),
    },
    RoleBehavior {
        role: Role::Lead,
        command: lookup_entity,
        infodump: None,
    },
    RoleBehavior {
        role: Role::Eng,
        command: lookup_bot_attribute,
        infodump: None,
    },
];

/// Routes admitted requests to their role's behavior.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    operator_address: String,
    bots: BotCatalog,
    entities: EntityCatalog,
}

impl Dispatcher {
    pub fn new(operator_address: impl Into<String>, bots: BotCatalog, entities: EntityCatalog) -> Self {
        Self {
            operator_address: operator_address.into(),
            bots,
            entities,
        }
    }

    /// Decide what, if anything, to send for an admitted request.
    pub fn dispatch(
        &self,
        role: Role,
        message: &InboundMessage,
        request: &Request,
    ) -> Result<Decision, AuthorizationError> {
        let behavior = BEHAVIORS
            .iter()
            .find(|b| b.role == role)
            .ok_or_else(|| AuthorizationError::UnknownSender(message.sender.clone()))?;

        let ctx = Context {
            sender: &message.sender,
            subject: &message.subject,
            operator: &self.operator_address,
            bots: &self.bots,
            entities: &self.entities,
        };

        match request {
            Request::InfoDump => {
                let handler = behavior.infodump.ok_or_else(|| {
                    AuthorizationError::InfodumpForbidden {
                        role: role.to_string(),
                    }
                })?;
                Ok(Decision {
                    action: handler(&ctx),
                    consumes_cooldown: false,
                })
            }
            Request::Command(command) => {
                debug!(role = %role, task = %command.task, "Trying command");
                let action = (behavior.command)(&ctx, command).ok_or_else(|| {
                    AuthorizationError::Rejected {
                        role: role.to_string(),
                        task: command.task.clone(),
                        parameter: command.parameter.clone(),
                    }
                })?;
                Ok(Decision {
                    action,
                    consumes_cooldown: true,
                })
            }
        }
    }
}

// ── Role behaviors ──────────────────────────────────────────────────

fn forward_robot_control(ctx: &Context<'_>, command: &Command) -> Option<Action> {
    if !command.task.contains(ROBOT_CONTROL_MARKER) {
        return None;
    }
    let text = format!("{} {} {}", ctx.sender, command.task, command.parameter);
    Some(Action::Forward(Response {
        to: ctx.operator.to_string(),
        subject: text.clone(),
        body: text,
    }))
}

fn dump_bot_catalog(ctx: &Context<'_>) -> Action {
    let body = ctx
        .bots
        .iter()
        .map(|(alias, attributes)| format!("{alias}: {}", json!(attributes)))
        .collect::<Vec<_>>()
        .join("\n");
    Action::Reply(Response {
        to: ctx.sender.to_string(),
        subject: INFODUMP_SUBJECT.to_string(),
        body,
    })
}

fn lookup_entity(ctx: &Context<'_>, command: &Command) -> Option<Action> {
    if command.task != LEAD_TASK {
        return None;
    }
    let entity = ctx.entities.get(&command.parameter)?;
    Some(reply(ctx, json!(entity).to_string()))
}

fn lookup_bot_attribute(ctx: &Context<'_>, command: &Command) -> Option<Action> {
    let value = ctx.bots.get(&command.task)?.get(&command.parameter)?;
    Some(reply(ctx, value.clone()))
}

/// `<subject> = <value>`, used as both subject and body.
fn reply(ctx: &Context<'_>, value: String) -> Action {
    let text = format!("{} = {}", ctx.subject, value);
    Action::Reply(Response {
        to: ctx.sender.to_string(),
        subject: text.clone(),
        body: text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::command::parse;
    use crate::table::Attributes;
    use chrono::Utc;

    const OPERATOR: &str = "gamemaster@gmail.com";

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn dispatcher() -> Dispatcher {
        let mut bots = BotCatalog::new();
        bots.insert("hp_bot".into(), attrs(&[("status", "ok"), ("team", "blue")]));
        bots.insert("mp_bot".into(), attrs(&[("status", "down")]));

        let mut entities = EntityCatalog::new();
        entities.insert(
            "lead1@x.com".into(),
            attrs(&[("title", "teamlead"), ("team", "red")]),
        );

        Dispatcher::new(OPERATOR, bots, entities)
    }

    fn message(sender: &str, subject: &str) -> InboundMessage {
        InboundMessage {
            id: "m".into(),
            sender: sender.into(),
            subject_raw: subject.into(),
            subject: subject.into(),
            timestamp: Utc::now(),
        }
    }

    fn run(role: Role, sender: &str, subject: &str) -> Result<Decision, AuthorizationError> {
        let request = parse(subject).expect("test subjects parse");
        dispatcher().dispatch(role, &message(sender, subject), &request)
    }

    #[test]
    fn dispatch_table() {
        // (role, subject, expected action label or None for rejection)
        let cases: &[(Role, &str, Option<&str>)] = &[
            (Role::Bot, "robotkill:3", Some("forward")),
            (Role::Bot, "killrobots:all", Some("forward")),
            (Role::Bot, "status:3", None),
            (Role::Bot, "hp_bot:status", None),
            (Role::Bot, "infodump", Some("reply")),
            (Role::Lead, "info:lead1@x.com", Some("reply")),
            (Role::Lead, "info:nobody@x.com", None),
            (Role::Lead, "hp_bot:status", None),
            (Role::Lead, "robotkill:3", None),
            (Role::Lead, "infodump", None),
            (Role::Eng, "hp_bot:status", Some("reply")),
            (Role::Eng, "hp_bot:missing", None),
            (Role::Eng, "nobot:status", None),
            (Role::Eng, "info:lead1@x.com", None),
            (Role::Eng, "robotkill:3", None),
            (Role::Eng, "infodump", None),
        ];

        for (role, subject, expected) in cases {
            let result = run(*role, "someone@x.com", subject);
            let label = result.as_ref().ok().map(|d| d.action.label());
            assert_eq!(label, *expected, "{role} {subject}");
        }
    }

    #[test]
    fn eng_query_replies_with_value() {
        let decision = run(Role::Eng, "eng1@x.com", "hp_bot:status").unwrap();
        assert!(decision.consumes_cooldown);
        assert_eq!(
            decision.action,
            Action::Reply(Response {
                to: "eng1@x.com".into(),
                subject: "hp_bot:status = ok".into(),
                body: "hp_bot:status = ok".into(),
            })
        );
    }

    #[test]
    fn lead_query_replies_with_entity_record() {
        let decision = run(Role::Lead, "lead1@x.com", "info:lead1@x.com").unwrap();
        assert_eq!(
            decision.action.response().body,
            r#"info:lead1@x.com = {"team":"red","title":"teamlead"}"#
        );
    }

    #[test]
    fn bot_forward_goes_to_operator() {
        let decision = run(Role::Bot, "bot1@x.com", "robotkill:3").unwrap();
        assert!(decision.consumes_cooldown);
        assert_eq!(
            decision.action,
            Action::Forward(Response {
                to: OPERATOR.into(),
                subject: "bot1@x.com robotkill 3".into(),
                body: "bot1@x.com robotkill 3".into(),
            })
        );
    }

    #[test]
    fn infodump_lists_every_bot() {
        let decision = run(Role::Bot, "bot1@x.com", "infodump").unwrap();
        assert!(!decision.consumes_cooldown);
        let response = decision.action.response();
        assert_eq!(response.to, "bot1@x.com");
        assert_eq!(response.subject, "info");
        assert_eq!(
            response.body,
            "hp_bot: {\"status\":\"ok\",\"team\":\"blue\"}\nmp_bot: {\"status\":\"down\"}"
        );
    }

    #[test]
    fn infodump_forbidden_for_other_roles() {
        for role in [Role::Lead, Role::Eng] {
            assert_eq!(
                run(role, "x@x.com", "infodump"),
                Err(AuthorizationError::InfodumpForbidden {
                    role: role.to_string()
                })
            );
        }
    }

    #[test]
    fn rejection_carries_command() {
        assert_eq!(
            run(Role::Eng, "eng1@x.com", "hp_bot:missing"),
            Err(AuthorizationError::Rejected {
                role: "eng".into(),
                task: "hp_bot".into(),
                parameter: "missing".into(),
            })
        );
    }
}
