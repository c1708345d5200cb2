//! In-memory stand-in for the benefits portal.
//!
//! It keeps the server-side state that makes the real portal awkward: one
//! view token that must be echoed exactly, one expanded category, and the
//! focus of the last detail shown, which sticks until "Back to Benefits
//! View" is clicked. Faults are injected per test.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use benefits_walker::wire::{form_token, form_value};
use benefits_walker::{Transport, TransportError};
use tokio_util::sync::CancellationToken;

pub const RESET_SOURCE: &str = "j_id_oo:j_id_op";
pub const MORE_SOURCE: &str = "j_id_q1:more";
const FORM: &str = "j_id_n8";
const GROUP: &str = "j_id_n9";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("benefits_walker=debug")
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub code: String,
    pub name: String,
    pub related_stub: Vec<String>,
    pub related_full: Option<Vec<String>>,
}

impl FakeItem {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            related_stub: Vec::new(),
            related_full: None,
        }
    }

    pub fn with_related(mut self, stub: &[&str], full: Option<&[&str]>) -> Self {
        self.related_stub = stub.iter().map(|s| s.to_string()).collect();
        self.related_full = full.map(|f| f.iter().map(|s| s.to_string()).collect());
        self
    }
}

#[derive(Debug, Clone)]
pub struct FakeCategory {
    pub name: String,
    pub items: Vec<FakeItem>,
}

impl FakeCategory {
    pub fn new(name: &str, items: Vec<FakeItem>) -> Self {
        Self {
            name: name.to_string(),
            items,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Reset,
    Expand(usize),
    Item(usize, usize),
    More,
    Unknown,
}

/// One POST as the portal saw it.
#[derive(Debug, Clone)]
pub struct Request {
    pub source: String,
    pub kind: Kind,
    pub token_sent: String,
    pub token_issued: Option<String>,
    pub rejected: bool,
}

#[derive(Default)]
struct Faults {
    desync: HashMap<String, usize>,
    item_timeouts: HashMap<String, usize>,
    related_timeouts: usize,
    related_rejections: usize,
    reset_fails_from: Option<usize>,
    refuse_after: Option<usize>,
    expire_after: Option<usize>,
    omit_reset_token: bool,
    cancel_after_items: Option<(usize, CancellationToken)>,
}

struct State {
    categories: Vec<FakeCategory>,
    token_seq: u64,
    token: String,
    expanded: Option<usize>,
    focus: Option<(usize, usize)>,
    resets: usize,
    items_served: usize,
    log: Vec<Request>,
    faults: Faults,
}

#[derive(Clone)]
pub struct FakePortal {
    state: Arc<Mutex<State>>,
}

impl FakePortal {
    pub fn new(categories: Vec<FakeCategory>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                categories,
                token_seq: 0,
                token: "T0".to_string(),
                expanded: None,
                focus: None,
                resets: 0,
                items_served: 0,
                log: Vec::new(),
                faults: Faults::default(),
            })),
        }
    }

    /// Diagnostic (2 items), Preventive (2 items, D0120 with a truncated
    /// related list) and an empty Orthodontics category.
    pub fn standard() -> Self {
        Self::new(vec![
            FakeCategory::new(
                "Diagnostic",
                vec![
                    FakeItem::new("D0210", "Intraoral complete series"),
                    FakeItem::new("D0220", "Periapical first film"),
                ],
            ),
            FakeCategory::new("Preventive", preventive_items()),
            FakeCategory::new("Orthodontics", Vec::new()),
        ])
    }

    /// Only the Preventive category.
    pub fn preventive() -> Self {
        Self::new(vec![FakeCategory::new("Preventive", preventive_items())])
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn token(&self) -> String {
        self.lock().token.clone()
    }

    /// Answer the next `times` detail requests for `code` with D0999.
    pub fn desync(&self, code: &str, times: usize) {
        self.lock().faults.desync.insert(code.to_string(), times);
    }

    pub fn time_out_item(&self, code: &str, times: usize) {
        self.lock().faults.item_timeouts.insert(code.to_string(), times);
    }

    pub fn time_out_related(&self, times: usize) {
        self.lock().faults.related_timeouts = times;
    }

    /// Answer the next `times` "More..." clicks with a JSF error.
    pub fn reject_related(&self, times: usize) {
        self.lock().faults.related_rejections = times;
    }

    /// The `nth` reset (1-based) and every later one times out.
    pub fn fail_resets_from(&self, nth: usize) {
        self.lock().faults.reset_fails_from = Some(nth);
    }

    /// Refuse connections once `count` requests have been answered.
    pub fn refuse_after(&self, count: usize) {
        self.lock().faults.refuse_after = Some(count);
    }

    /// Redirect to the login page once `count` requests have been answered.
    pub fn expire_after(&self, count: usize) {
        self.lock().faults.expire_after = Some(count);
    }

    pub fn omit_reset_token(&self) {
        self.lock().faults.omit_reset_token = true;
    }

    /// Fire `cancel` right after the `count`-th detail response.
    pub fn cancel_after_items(&self, count: usize, cancel: CancellationToken) {
        self.lock().faults.cancel_after_items = Some((count, cancel));
    }

    pub fn requests(&self) -> Vec<Request> {
        self.lock().log.clone()
    }

    pub fn kinds(&self) -> Vec<Kind> {
        self.lock().log.iter().map(|r| r.kind).collect()
    }

    pub fn item_requests(&self, category: usize, item: usize) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|r| r.kind == Kind::Item(category, item))
            .count()
    }
}

fn preventive_items() -> Vec<FakeItem> {
    vec![
        FakeItem::new("D0120", "Periodic oral evaluation").with_related(
            &["D0140 - Limited evaluation", "D0150 - Comprehensive evaluation"],
            Some(&[
                "D0140 - Limited evaluation",
                "D0160 - Detailed evaluation",
                "D0170 - Re-evaluation",
            ]),
        ),
        FakeItem::new("D0150", "Comprehensive oral evaluation")
            .with_related(&["D0120 - Periodic evaluation"], None),
    ]
}

impl State {
    fn issue_token(&mut self) -> String {
        self.token_seq += 1;
        self.token = format!("T{}", self.token_seq);
        self.token.clone()
    }

    fn classify(&self, source: &str) -> Kind {
        if source == RESET_SOURCE {
            return Kind::Reset;
        }
        if source == MORE_SOURCE {
            return Kind::More;
        }
        let parts: Vec<&str> = source.split(':').collect();
        match parts.as_slice() {
            [FORM, GROUP, c, "j_id_na"] => c.parse().map(Kind::Expand).unwrap_or(Kind::Unknown),
            [FORM, GROUP, c, "j_id_ni", k, "j_id_nm"] => match (c.parse(), k.parse()) {
                (Ok(c), Ok(k)) => Kind::Item(c, k),
                _ => Kind::Unknown,
            },
            _ => Kind::Unknown,
        }
    }

    fn handle(&mut self, kind: Kind) -> Result<String, TransportError> {
        match kind {
            Kind::Reset => {
                self.resets += 1;
                if self.faults.reset_fails_from.is_some_and(|n| self.resets >= n) {
                    return Err(TransportError::Timeout);
                }
                // Back to the summary view; the category list keeps its
                // expanded row.
                self.focus = None;
                let token = self.issue_token();
                let token = (!self.faults.omit_reset_token).then_some(token);
                Ok(partial(&[("ben-summary-2", "<div id=\"ben-summary-2\">Benefits summary</div>".to_string())], token.as_deref()))
            }
            Kind::Expand(c) => {
                if c >= self.categories.len() {
                    return Ok(server_error("Component not found"));
                }
                self.expanded = Some(c);
                self.focus = None;
                let html = category_html(&self.categories, c);
                let token = self.issue_token();
                Ok(partial(&[("servicesGroup", html)], Some(&token)))
            }
            Kind::Item(c, k) => self.item(c, k),
            Kind::More => {
                if self.faults.related_timeouts > 0 {
                    self.faults.related_timeouts -= 1;
                    return Err(TransportError::Timeout);
                }
                if self.faults.related_rejections > 0 {
                    self.faults.related_rejections -= 1;
                    return Ok(server_error("Could not render related procedures"));
                }
                let labels = self
                    .focus
                    .and_then(|(c, k)| self.categories[c].items[k].related_full.clone())
                    .unwrap_or_default();
                let token = self.issue_token();
                Ok(partial(&[("proc-related-procedures", related_html(&labels, false))], Some(&token)))
            }
            Kind::Unknown => Ok(server_error("Unknown component")),
        }
    }

    fn item(&mut self, c: usize, k: usize) -> Result<String, TransportError> {
        // Without a reset in between, the previous detail keeps the focus.
        let shown = match (self.focus, self.expanded) {
            (Some(previous), _) => Some(previous),
            (None, Some(e)) if e == c => Some((c, k)),
            (None, Some(e)) => Some((e, k)),
            (None, None) => None,
        }
        .filter(|(c, k)| self.categories.get(*c).is_some_and(|cat| *k < cat.items.len()));

        let Some((sc, sk)) = shown else {
            let token = self.issue_token();
            return Ok(partial(&[("ben-summary-2", "<div><p>Select a category</p></div>".to_string())], Some(&token)));
        };
        let item = self.categories[sc].items[sk].clone();

        if let Some(left) = self.faults.item_timeouts.get_mut(&item.code) {
            if *left > 0 {
                *left -= 1;
                return Err(TransportError::Timeout);
            }
        }

        let token = self.issue_token();
        self.items_served += 1;
        if let Some((count, cancel)) = &self.faults.cancel_after_items {
            if self.items_served >= *count {
                cancel.cancel();
            }
        }

        if let Some(left) = self.faults.desync.get_mut(&item.code) {
            if *left > 0 {
                *left -= 1;
                let bogus = FakeItem::new("D0999", "Unrelated procedure");
                return Ok(partial(&[("ben-summary-2", detail_html(&bogus))], Some(&token)));
            }
        }

        self.focus = Some((sc, sk));
        Ok(partial(&[("ben-summary-2", detail_html(&item))], Some(&token)))
    }

    fn page(&self) -> String {
        let mut headers = String::new();
        for (i, category) in self.categories.iter().enumerate() {
            let glyph = if self.expanded == Some(i) { "minus" } else { "plus" };
            headers.push_str(&format!(
                r#"<table id="{FORM}:{GROUP}:{i}:j_id_na" onclick="jsf.ajax.request(this,event,{{render:'servicesGroup'}}); return false;">
                   <tr><td><span class="glyphicon glyphicon-{glyph}"></span> {}</td><td>{} procedures</td></tr></table>"#,
                category.name,
                category.items.len()
            ));
        }
        format!(
            r#"<!DOCTYPE html><html><body>
            <form id="{FORM}"><div id="servicesGroup">{headers}</div>
            <input type="hidden" name="javax.faces.ViewState" value="{}" /></form>
            <form id="j_id_oo"><a id="{RESET_SOURCE}" href="" onclick="return false;">Back to Benefits View</a></form>
            </body></html>"#,
            self.token
        )
    }
}

#[async_trait]
impl Transport for FakePortal {
    async fn fetch_page(&self) -> Result<String, TransportError> {
        Ok(self.lock().page())
    }

    async fn submit(&self, form: &[(String, String)]) -> Result<String, TransportError> {
        let mut state = self.lock();
        let source = form_value(form, "javax.faces.source").unwrap_or_default().to_string();
        let sent = form_token(form).unwrap_or_default().to_string();
        let kind = state.classify(&source);
        let answered = state.log.iter().filter(|r| !r.rejected).count();

        if state.faults.refuse_after.is_some_and(|n| answered >= n) {
            return Err(TransportError::Connect("connection refused".into()));
        }
        if state.faults.expire_after.is_some_and(|n| answered >= n) {
            return Ok(r#"<partial-response><redirect url="/login.xhtml?expired=true"/></partial-response>"#.to_string());
        }

        if sent != state.token {
            state.log.push(Request {
                source,
                kind,
                token_sent: sent,
                token_issued: None,
                rejected: true,
            });
            return Ok(server_error("View could not be restored"));
        }

        let before = state.token_seq;
        let outcome = state.handle(kind);
        let issued = (state.token_seq != before).then(|| state.token.clone());
        state.log.push(Request {
            source,
            kind,
            token_sent: sent,
            token_issued: issued,
            rejected: false,
        });
        outcome
    }
}

fn partial(updates: &[(&str, String)], token: Option<&str>) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><partial-response id="j_id__v_0"><changes>"#,
    );
    for (id, html) in updates {
        xml.push_str(&format!(r#"<update id="{id}"><![CDATA[{html}]]></update>"#));
    }
    if let Some(token) = token {
        xml.push_str(&format!(
            r#"<update id="j_id__v_0:javax.faces.ViewState:1"><![CDATA[{token}]]></update>"#
        ));
    }
    xml.push_str("</changes></partial-response>");
    xml
}

fn server_error(message: &str) -> String {
    format!(
        r#"<partial-response><error><error-name>javax.faces.application.ViewExpiredException</error-name><error-message><![CDATA[{message}]]></error-message></error></partial-response>"#
    )
}

fn summary_rows(items: &[FakeItem], c: usize) -> String {
    items
        .iter()
        .enumerate()
        .map(|(k, item)| {
            format!(
                r##"<tr><td>{code}</td><td><a href="#" id="{FORM}:{GROUP}:{c}:j_id_ni:{k}:j_id_nm">{name} &gt;</a></td>
                <td>Yes</td><td>$30.00</td><td>100%</td><td>1 per 6 months</td><td>No</td><td>Yes</td></tr>"##,
                code = item.code,
                name = item.name,
            )
        })
        .collect()
}

/// A hidden copy of another category's table precedes the live one.
fn category_html(categories: &[FakeCategory], c: usize) -> String {
    let stale = (c + 1) % categories.len();
    format!(
        r#"<div id="servicesGroup">
        <div class="hidden"><table id="benefitDetailAllServiceProceduresList"><tbody>{}</tbody></table></div>
        <div><table id="benefitDetailAllServiceProceduresList"><tbody>{}</tbody></table></div>
        </div>"#,
        summary_rows(&categories[stale].items, stale),
        summary_rows(&categories[c].items, c),
    )
}

fn related_html(labels: &[String], more: bool) -> String {
    let mut html = String::from(r#"<div id="proc-related-procedures"><ul>"#);
    for label in labels {
        html.push_str(&format!(r##"<li><a href="#">{label} &gt;</a></li>"##));
    }
    html.push_str("</ul>");
    if more {
        html.push_str(&format!(
            r##"<a href="#" onclick="return myfaces.oam.submitForm(document.getElementById('{MORE_SOURCE}'));">More...</a>"##
        ));
    }
    html.push_str("</div>");
    html
}

fn detail_html(item: &FakeItem) -> String {
    format!(
        r#"<div id="ben-summary-2">
        <div class="hidden"><div id="benefitProcedurePanel"><h2 class="h4">D0000: Previous panel</h2></div></div>
        <div id="benefitProcedurePanel">
          <h2 class="h4">{code}: {name}</h2>
          <table id="procedureDetailInfoTable1"><tbody>
            <tr><td>Yes</td><td>$30.00</td><td>100%</td><td>1 per 6 months</td><td>No</td><td>Yes</td></tr>
          </tbody></table>
          <table id="procedureDetailInfoTable2"><tbody><tr><td>No cost share for {code}</td></tr></tbody></table>
          {related}
          <table id="procedureServiceHistoryPanelList"><tbody>
            <tr><td>03/02/2024</td><td>{code}</td><td></td><td></td></tr>
          </tbody></table>
          <div id="policyDetails"><table><tbody><tr><td>Frequency</td><td>Once per six months</td></tr></tbody></table></div>
          <div id="proc-dictionary"><table><tr><td>{name}</td><td><span>Definition of {code}</span></td></tr></table></div>
        </div>
        </div>"#,
        code = item.code,
        name = item.name,
        related = related_html(&item.related_stub, item.related_full.is_some()),
    )
}
