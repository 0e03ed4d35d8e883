//! Trade lifecycle engine - drives chat events through draft, close and
//! query flows
//!
//! Two state machines share one session slot per conversation: the entry
//! flow (hub-and-spoke editing over a draft) and the close flow (pick an
//! open trade, collect price and fee, confirm). Everything else is a
//! stateless command or menu token. `handle` is total: every error is
//! rendered into a reply according to its recovery rule.

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::draft::{self, DraftStatus, Field, TradeDraft};
use crate::error::{JournalError, Result};
use crate::export;
use crate::menus;
use crate::pnl;
use crate::session::{CloseStep, EntryStep, SessionKey, SessionManager, SessionState};
use crate::stats::{aggregate, legs_of};
use crate::trade_db::TradeStore;
use crate::types::{Choice, CloseOutcome, CloseReason, Event, EventKind, NewTrade, Reply, Trade, TradeStatus};

/// The journal engine: owns the store handle, the live sessions and the
/// closing policy
pub struct Journal {
    store: Arc<TradeStore>,
    sessions: SessionManager,
    config: Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    NewTrade,
    Open,
    CloseTrade,
    Stats,
    Export,
    Cancel,
}

impl Command {
    fn parse(text: &str) -> Option<Command> {
        match text.trim() {
            "/start" => Some(Command::Start),
            "/newtrade" => Some(Command::NewTrade),
            "/open" => Some(Command::Open),
            "/closetrade" => Some(Command::CloseTrade),
            "/stats" => Some(Command::Stats),
            "/export" => Some(Command::Export),
            "/cancel" => Some(Command::Cancel),
            _ => None,
        }
    }
}

/// What applying a menu token to a collection step led to
enum ChoiceApplied {
    Done,
    NeedText,
}

impl Journal {
    pub fn new(store: Arc<TradeStore>, config: Config) -> Self {
        Journal {
            store,
            sessions: SessionManager::new(),
            config,
        }
    }

    /// Process one inbound event. Never fails outward: errors become
    /// replies, with the session left where the recovery rule puts it.
    pub fn handle(&self, event: &Event) -> Reply {
        match self.dispatch(event) {
            Ok(reply) => reply,
            Err(err) => self.recover(event, err),
        }
    }

    /// Sweep sessions idle past the configured TTL
    pub fn expire_idle_sessions(&self) -> usize {
        self.sessions
            .expire_idle(Duration::minutes(self.config.session_ttl_minutes))
    }

    fn dispatch(&self, event: &Event) -> Result<Reply> {
        let key = SessionKey {
            user_id: event.user_id,
            chat_id: event.chat_id,
        };

        if let EventKind::Text { text } = &event.kind {
            if let Some(cmd) = Command::parse(text) {
                return self.run_command(key, cmd);
            }
        }

        // Query tokens stay reachable even while a draft is in flight
        if let EventKind::Choice { token } = &event.kind {
            if ["stats:", "istat:", "range:"].iter().any(|p| token.starts_with(p)) {
                return self.menu_token(key, token);
            }
        }

        match self.sessions.snapshot(&key) {
            Some(state) => {
                let (next, reply) = self.advance(key, state, &event.kind)?;
                match next {
                    Some(state) => self.sessions.store(key, state),
                    None => {
                        self.sessions.destroy(&key);
                    }
                }
                Ok(reply)
            }
            None => match &event.kind {
                EventKind::Choice { token } => self.menu_token(key, token),
                EventKind::Text { .. } => Ok(hint()),
            },
        }
    }

    fn run_command(&self, key: SessionKey, cmd: Command) -> Result<Reply> {
        debug!("User {} runs {:?}", key.user_id, cmd);
        match cmd {
            Command::Start => Ok(Reply::text(format!(
                "👋 Hi! I'm your trade journal.\n\n{}",
                hint().text
            ))),

            Command::NewTrade => {
                let draft = TradeDraft::default();
                let reply = hub_reply(&draft);
                self.sessions.begin(
                    key,
                    SessionState::Entry {
                        draft,
                        step: EntryStep::Editing,
                    },
                );
                Ok(reply)
            }

            Command::Open => self.list_open(key),

            Command::CloseTrade => {
                let trades = self.store.get_open_trades(key.user_id)?;
                if trades.is_empty() {
                    return Ok(Reply::text("🟢 You have no open trades."));
                }
                let choices = trades
                    .iter()
                    .map(|t| {
                        Choice::new(
                            format!(
                                "#{} {} @ ${} → {}",
                                t.id,
                                t.instrument,
                                t.entry_price,
                                t.targets.as_deref().unwrap_or("—")
                            ),
                            format!("close:{}", t.id),
                        )
                    })
                    .collect();
                self.sessions.begin(
                    key,
                    SessionState::Close {
                        step: CloseStep::SelectTrade,
                    },
                );
                Ok(Reply::with_choices("Pick a trade to close:", choices))
            }

            Command::Stats => Ok(stats_menu()),

            Command::Export => {
                let mut trades = self.store.get_open_trades(key.user_id)?;
                trades.extend(self.store.get_closed_trades(key.user_id)?);
                let path = export::export_trades(
                    Path::new(&self.config.export_dir),
                    key.user_id,
                    &trades,
                )?;
                Ok(Reply::text(format!(
                    "📤 Exported {} trade(s) to {}",
                    trades.len(),
                    path.display()
                )))
            }

            Command::Cancel => {
                if self.sessions.destroy(&key) {
                    Ok(Reply::text("✖ Cancelled."))
                } else {
                    Ok(Reply::text("Nothing to cancel."))
                }
            }
        }
    }

    /// Stateless menu tokens: stats windows, instrument drill-down,
    /// calendar ranges
    fn menu_token(&self, key: SessionKey, token: &str) -> Result<Reply> {
        if let Some(rest) = token.strip_prefix("stats:") {
            return match rest {
                "all" => {
                    let rows = self.store.get_closed_trades(key.user_id)?;
                    Ok(self.stats_over("all time", &rows))
                }
                "7" => self.stats_window(key, 7),
                "30" => self.stats_window(key, 30),
                "instruments" => {
                    let symbols = self
                        .store
                        .get_active_instruments(key.user_id, self.config.instrument_lookback_days)?;
                    if symbols.is_empty() {
                        return Ok(Reply::text("😕 No active instruments yet."));
                    }
                    let choices = symbols
                        .iter()
                        .map(|s| Choice::new(s.clone(), format!("istat:{s}")))
                        .collect();
                    Ok(Reply::with_choices("Pick an instrument:", choices))
                }
                _ => Ok(hint()),
            };
        }

        if let Some(symbol) = token.strip_prefix("istat:") {
            return self.instrument_stats(key.user_id, symbol);
        }

        if let Some(rest) = token.strip_prefix("range:") {
            let (start, end) = parse_range(rest)?;
            let rows = self.store.get_closed_in_range(key.user_id, start, end)?;
            return Ok(self.stats_over(&format!("{start} to {end}"), &rows));
        }

        Ok(hint())
    }

    fn stats_window(&self, key: SessionKey, days: i64) -> Result<Reply> {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(days - 1);
        let rows = self.store.get_closed_in_range(key.user_id, start, end)?;
        Ok(self.stats_over(&format!("last {days} days"), &rows))
    }

    fn stats_over(&self, title: &str, rows: &[Trade]) -> Reply {
        if rows.is_empty() {
            return Reply::text(format!(
                "😕 No closed trades ({title}). Record one with /newtrade"
            ));
        }
        let stats = aggregate(legs_of(rows));
        Reply::text(format!("📊 Your statistics ({title}):\n{stats}"))
    }

    fn instrument_stats(&self, user_id: i64, symbol: &str) -> Result<Reply> {
        match self.store.get_instrument_stats(user_id, symbol)? {
            None => Ok(Reply::text(format!("😕 No closed trades for {symbol} yet."))),
            Some(per) => {
                let last = per
                    .last_closed_at
                    .map(|dt| dt.date_naive().to_string())
                    .unwrap_or_else(|| "—".to_string());
                Ok(Reply::text(format!(
                    "📊 {symbol}:\n{}\nLast close: {last}",
                    per.stats
                )))
            }
        }
    }

    fn list_open(&self, key: SessionKey) -> Result<Reply> {
        let trades = self.store.get_open_trades(key.user_id)?;
        if trades.is_empty() {
            return Ok(Reply::text("🟢 You have no open trades."));
        }
        let mut text = String::from("🧾 Open trades:\n");
        for t in &trades {
            text.push_str(&format!(
                "\n#{} {} [{}]\nEntry: ${}\nSize: {} USDT\nTargets: {}\nStop: {}\nOpened: {}\n",
                t.id,
                t.instrument,
                t.timeframe.as_deref().unwrap_or("—"),
                t.entry_price,
                t.position_size,
                t.targets.as_deref().unwrap_or("—"),
                t.stop
                    .map(|s| format!("${s}"))
                    .unwrap_or_else(|| "—".to_string()),
                t.created_at.date_naive(),
            ));
        }
        Ok(Reply::text(text))
    }

    fn advance(
        &self,
        key: SessionKey,
        state: SessionState,
        kind: &EventKind,
    ) -> Result<(Option<SessionState>, Reply)> {
        match state {
            SessionState::Entry { draft, step } => self.advance_entry(key, draft, step, kind),
            SessionState::Close { step } => self.advance_close(key, step, kind),
        }
    }

    fn advance_entry(
        &self,
        key: SessionKey,
        mut draft: TradeDraft,
        step: EntryStep,
        kind: &EventKind,
    ) -> Result<(Option<SessionState>, Reply)> {
        match step {
            EntryStep::Editing => match kind {
                EventKind::Choice { token } => match token.as_str() {
                    "save" => self.try_finalize(draft),
                    "cancel" => Ok((None, Reply::text("✖ Draft discarded."))),
                    other => {
                        if let Some(field) = Field::from_token(other) {
                            let reply = prompt_for(field);
                            Ok((
                                Some(SessionState::Entry {
                                    draft,
                                    step: EntryStep::Collecting(field),
                                }),
                                reply,
                            ))
                        } else {
                            let reply = hub_reply(&draft);
                            Ok((Some(SessionState::Entry { draft, step }), reply))
                        }
                    }
                },
                EventKind::Text { .. } => {
                    let reply = hub_reply(&draft);
                    Ok((Some(SessionState::Entry { draft, step }), reply))
                }
            },

            EntryStep::Collecting(field) => {
                match kind {
                    EventKind::Text { text } => draft.apply_text(field, text)?,
                    EventKind::Choice { token } => {
                        match apply_choice(&mut draft, field, token)? {
                            ChoiceApplied::Done => {}
                            ChoiceApplied::NeedText => {
                                let reply = Reply::text(field.prompt());
                                return Ok((
                                    Some(SessionState::Entry {
                                        draft,
                                        step: EntryStep::Collecting(field),
                                    }),
                                    reply,
                                ));
                            }
                        }
                    }
                }

                // A manually-closed draft still owes close price and exit fee
                if field == Field::Status
                    && draft.status == Some(DraftStatus::ClosedManual)
                    && draft.close_price.is_none()
                {
                    return Ok((
                        Some(SessionState::Entry {
                            draft,
                            step: EntryStep::Collecting(Field::ClosePrice),
                        }),
                        prompt_for(Field::ClosePrice),
                    ));
                }
                if field == Field::ClosePrice
                    && draft.status == Some(DraftStatus::ClosedManual)
                    && draft.exit_fee_pct.is_none()
                {
                    return Ok((
                        Some(SessionState::Entry {
                            draft,
                            step: EntryStep::Collecting(Field::ExitFee),
                        }),
                        prompt_for(Field::ExitFee),
                    ));
                }

                let reply = hub_reply(&draft);
                Ok((
                    Some(SessionState::Entry {
                        draft,
                        step: EntryStep::Editing,
                    }),
                    reply,
                ))
            }

            EntryStep::AwaitingConfirmation => match kind {
                EventKind::Choice { token } if token == "confirm" => self.persist_draft(key, draft),
                EventKind::Choice { token } if token == "back" => {
                    let reply = hub_reply(&draft);
                    Ok((
                        Some(SessionState::Entry {
                            draft,
                            step: EntryStep::Editing,
                        }),
                        reply,
                    ))
                }
                EventKind::Choice { token } if token == "cancel" => {
                    Ok((None, Reply::text("✖ Draft discarded.")))
                }
                _ => {
                    let reply = self.confirmation_reply(&draft)?;
                    Ok((Some(SessionState::Entry { draft, step }), reply))
                }
            },
        }
    }

    /// `editing → awaiting-confirmation`, or a Validation error back to the
    /// hub. No side effects on failure.
    fn try_finalize(&self, draft: TradeDraft) -> Result<(Option<SessionState>, Reply)> {
        draft.validate()?;
        let reply = self.confirmation_reply(&draft)?;
        Ok((
            Some(SessionState::Entry {
                draft,
                step: EntryStep::AwaitingConfirmation,
            }),
            reply,
        ))
    }

    /// Status-dependent close derivation: (close price, exit fee, reason)
    fn derive_close(&self, draft: &TradeDraft) -> Result<Option<(Decimal, Decimal, CloseReason)>> {
        match draft.status {
            None | Some(DraftStatus::Open) => Ok(None),
            Some(DraftStatus::ClosedTarget) => {
                let targets = draft.targets.clone().unwrap_or_default();
                let price = draft::first_target(&targets).ok_or_else(|| JournalError::InputFormat {
                    what: "a numeric first target".to_string(),
                    input: targets.clone(),
                })?;
                Ok(Some((price, self.config.default_exit_fee_pct, CloseReason::Target)))
            }
            Some(DraftStatus::ClosedStop) => {
                let stop = draft
                    .stop
                    .ok_or_else(|| JournalError::Validation(vec![Field::Stop.label()]))?;
                Ok(Some((stop, self.config.default_exit_fee_pct, CloseReason::Stop)))
            }
            Some(DraftStatus::ClosedManual) => {
                let close_price = draft
                    .close_price
                    .ok_or_else(|| JournalError::Validation(vec![Field::ClosePrice.label()]))?;
                let exit_fee_pct = draft
                    .exit_fee_pct
                    .ok_or_else(|| JournalError::Validation(vec![Field::ExitFee.label()]))?;
                Ok(Some((close_price, exit_fee_pct, CloseReason::Manual)))
            }
        }
    }

    fn confirmation_reply(&self, draft: &TradeDraft) -> Result<Reply> {
        let mut text = String::from("Review the trade:\n\n");
        for field in draft.menu_fields() {
            text.push_str(&format!("{}: {}\n", field.label(), draft.display_value(field)));
        }

        if let Some((close_price, exit_fee_pct, reason)) = self.derive_close(draft)? {
            let (entry_price, position_size, entry_fee_pct) = required_economics(draft)?;
            let breakdown = pnl::close(entry_price, position_size, entry_fee_pct, close_price, exit_fee_pct)?;
            text.push_str(&format!(
                "\nClosing via {} at ${close_price}, exit fee {exit_fee_pct}%\n📈 PnL: {:.2}%\n💰 Profit: {:.2} USDT\n",
                reason.as_str(),
                breakdown.pnl_pct,
                breakdown.profit,
            ));
        }

        text.push_str("\nSave this trade?");
        Ok(Reply::with_choices(
            text,
            vec![
                Choice::new("✅ Save", "confirm"),
                Choice::new("↩ Back", "back"),
                Choice::new("✖ Cancel", "cancel"),
            ],
        ))
    }

    fn persist_draft(
        &self,
        key: SessionKey,
        draft: TradeDraft,
    ) -> Result<(Option<SessionState>, Reply)> {
        draft.validate()?;
        let (entry_price, position_size, entry_fee_pct) = required_economics(&draft)?;

        let close = match self.derive_close(&draft)? {
            Some((close_price, exit_fee_pct, reason)) => {
                let breakdown =
                    pnl::close(entry_price, position_size, entry_fee_pct, close_price, exit_fee_pct)?;
                Some(CloseOutcome {
                    close_price,
                    exit_fee_pct,
                    profit: pnl::round2(breakdown.profit),
                    pnl_pct: pnl::round2(breakdown.pnl_pct),
                    reason,
                })
            }
            None => None,
        };

        let instrument = draft
            .instrument
            .clone()
            .ok_or_else(|| JournalError::Validation(vec![Field::Instrument.label()]))?;
        let record = NewTrade {
            user_id: key.user_id,
            chat_id: key.chat_id,
            instrument,
            timeframe: draft.timeframe.clone(),
            entry_price,
            targets: draft.targets.clone(),
            stop: draft.stop,
            position_size,
            entry_fee_pct,
            reason: draft.reason.clone(),
            tags: draft.tags.clone(),
            comment: draft.comment.clone(),
            close,
        };

        let id = self.store.create(&record)?;
        info!("Trade #{} recorded for user {}", id, key.user_id);

        let text = match &record.close {
            Some(c) => format!(
                "✅ Trade #{id} saved (closed)!\n📈 PnL: {}%\n💰 Profit: {} USDT\n\nWant statistics? Try /stats",
                c.pnl_pct, c.profit
            ),
            None => format!("✅ Trade #{id} saved!\n\nWant statistics? Try /stats"),
        };
        Ok((None, Reply::text(text)))
    }

    fn advance_close(
        &self,
        key: SessionKey,
        step: CloseStep,
        kind: &EventKind,
    ) -> Result<(Option<SessionState>, Reply)> {
        match step {
            CloseStep::SelectTrade => {
                let id = match kind {
                    EventKind::Choice { token } => token
                        .strip_prefix("close:")
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or_else(|| JournalError::InputFormat {
                            what: "a trade from the list".to_string(),
                            input: token.clone(),
                        })?,
                    // Typing "12" or "12: ETH/USDT …" also selects
                    EventKind::Text { text } => text
                        .split(':')
                        .next()
                        .and_then(|s| s.trim().parse::<i64>().ok())
                        .ok_or_else(|| JournalError::InputFormat {
                            what: "a trade from the list".to_string(),
                            input: text.clone(),
                        })?,
                };

                let trade = self.store.get_trade(id, key.user_id)?;
                if trade.status != TradeStatus::Open {
                    return Err(JournalError::NotFound(id));
                }
                Ok((
                    Some(SessionState::Close {
                        step: CloseStep::ClosePrice { trade_id: id },
                    }),
                    Reply::text(Field::ClosePrice.prompt()),
                ))
            }

            CloseStep::ClosePrice { trade_id } => match kind {
                EventKind::Text { text } => {
                    let close_price = draft::parse_positive("close price", text)?;
                    Ok((
                        Some(SessionState::Close {
                            step: CloseStep::ExitFee { trade_id, close_price },
                        }),
                        Reply::with_choices(Field::ExitFee.prompt(), menus::choices(menus::FEE_TIERS)),
                    ))
                }
                EventKind::Choice { token } => Err(JournalError::InputFormat {
                    what: "a close price".to_string(),
                    input: token.clone(),
                }),
            },

            CloseStep::ExitFee { trade_id, close_price } => {
                let exit_fee_pct = match kind {
                    EventKind::Text { text } => draft::parse_fee("exit fee", text)?,
                    EventKind::Choice { token } => match token.strip_prefix("fee:") {
                        Some("custom") => {
                            return Ok((
                                Some(SessionState::Close { step }),
                                Reply::text(Field::ExitFee.prompt()),
                            ))
                        }
                        Some(value) => draft::parse_fee("exit fee", value)?,
                        None => {
                            return Err(JournalError::InputFormat {
                                what: "an exit fee".to_string(),
                                input: token.clone(),
                            })
                        }
                    },
                };

                let reply = self.close_confirm_reply(key.user_id, trade_id, close_price, exit_fee_pct)?;
                Ok((
                    Some(SessionState::Close {
                        step: CloseStep::Confirm {
                            trade_id,
                            close_price,
                            exit_fee_pct,
                        },
                    }),
                    reply,
                ))
            }

            CloseStep::Confirm {
                trade_id,
                close_price,
                exit_fee_pct,
            } => match kind {
                EventKind::Choice { token } if token == "confirm" => {
                    let trade = self.store.get_trade(trade_id, key.user_id)?;
                    if trade.status != TradeStatus::Open {
                        return Err(JournalError::NotFound(trade_id));
                    }
                    let breakdown = pnl::close(
                        trade.entry_price,
                        trade.position_size,
                        trade.entry_fee_pct,
                        close_price,
                        exit_fee_pct,
                    )?;
                    let outcome = CloseOutcome {
                        close_price,
                        exit_fee_pct,
                        profit: pnl::round2(breakdown.profit),
                        pnl_pct: pnl::round2(breakdown.pnl_pct),
                        reason: CloseReason::Manual,
                    };
                    self.store.close_by_id(trade_id, key.user_id, &outcome)?;
                    Ok((
                        None,
                        Reply::text(format!(
                            "✅ Trade closed!\n📉 Close price: ${close_price}\n📈 PnL: {}%\n💰 Profit: {} USDT",
                            outcome.pnl_pct, outcome.profit
                        )),
                    ))
                }
                EventKind::Choice { token } if token == "cancel" => {
                    Ok((None, Reply::text("✖ Close aborted.")))
                }
                _ => {
                    let reply = self.close_confirm_reply(key.user_id, trade_id, close_price, exit_fee_pct)?;
                    Ok((Some(SessionState::Close { step }), reply))
                }
            },
        }
    }

    fn close_confirm_reply(
        &self,
        user_id: i64,
        trade_id: i64,
        close_price: Decimal,
        exit_fee_pct: Decimal,
    ) -> Result<Reply> {
        let trade = self.store.get_trade(trade_id, user_id)?;
        if trade.status != TradeStatus::Open {
            return Err(JournalError::NotFound(trade_id));
        }
        let breakdown = pnl::close(
            trade.entry_price,
            trade.position_size,
            trade.entry_fee_pct,
            close_price,
            exit_fee_pct,
        )?;
        Ok(Reply::with_choices(
            format!(
                "Close #{} {}?\n📉 Close price: ${close_price}\n📈 PnL: {:.2}%\n💰 Profit: {:.2} USDT",
                trade.id, trade.instrument, breakdown.pnl_pct, breakdown.profit
            ),
            vec![
                Choice::new("✅ Close trade", "confirm"),
                Choice::new("✖ Cancel", "cancel"),
            ],
        ))
    }

    /// Render an error into a reply per its recovery rule
    fn recover(&self, event: &Event, err: JournalError) -> Reply {
        let key = SessionKey {
            user_id: event.user_id,
            chat_id: event.chat_id,
        };
        match &err {
            JournalError::InputFormat { .. } => {
                debug!("Re-prompting user {} after input error: {}", key.user_id, err);
                let mut reply = self.reprompt(&key).unwrap_or_else(hint);
                reply.text = format!("❌ {err}\n\n{}", reply.text);
                reply
            }
            JournalError::Validation(_) => {
                let mut reply = self.reprompt(&key).unwrap_or_else(hint);
                reply.text = format!("⚠️ {err}\n\n{}", reply.text);
                reply
            }
            JournalError::NotFound(_) => {
                self.sessions.destroy(&key);
                Reply::text(format!("❌ {err}\n\n{}", hint().text))
            }
            JournalError::DivisionUndefined => {
                let mut reply = self.reprompt(&key).unwrap_or_else(hint);
                reply.text = format!("❌ {err}\n\n{}", reply.text);
                reply
            }
            JournalError::Storage(_) | JournalError::Serialize(_) | JournalError::Io(_) => {
                error!("Aborting user {} flow: {}", key.user_id, err);
                self.sessions.destroy(&key);
                Reply::text(format!(
                    "❌ Something went wrong; the operation was aborted.\n\n{}",
                    hint().text
                ))
            }
        }
    }

    /// Prompt matching the session's current step, for error recovery
    fn reprompt(&self, key: &SessionKey) -> Option<Reply> {
        let state = self.sessions.snapshot(key)?;
        Some(match &state {
            SessionState::Entry { draft, step } => match step {
                EntryStep::Editing => hub_reply(draft),
                EntryStep::Collecting(field) => prompt_for(*field),
                EntryStep::AwaitingConfirmation => self
                    .confirmation_reply(draft)
                    .unwrap_or_else(|_| hub_reply(draft)),
            },
            SessionState::Close { step } => match step {
                CloseStep::SelectTrade => Reply::text("Pick a trade from the list."),
                CloseStep::ClosePrice { .. } => Reply::text(Field::ClosePrice.prompt()),
                CloseStep::ExitFee { .. } => {
                    Reply::with_choices(Field::ExitFee.prompt(), menus::choices(menus::FEE_TIERS))
                }
                CloseStep::Confirm { .. } => Reply::text("Confirm or cancel."),
            },
        })
    }
}

fn required_economics(draft: &TradeDraft) -> Result<(Decimal, Decimal, Decimal)> {
    let entry_price = draft
        .entry_price
        .ok_or_else(|| JournalError::Validation(vec![Field::EntryPrice.label()]))?;
    let position_size = draft
        .position_size
        .ok_or_else(|| JournalError::Validation(vec![Field::PositionSize.label()]))?;
    let entry_fee_pct = draft
        .entry_fee_pct
        .ok_or_else(|| JournalError::Validation(vec![Field::EntryFee.label()]))?;
    Ok((entry_price, position_size, entry_fee_pct))
}

/// Apply a menu token to the field being collected
fn apply_choice(draft: &mut TradeDraft, field: Field, token: &str) -> Result<ChoiceApplied> {
    let mismatch = || JournalError::InputFormat {
        what: field.label().to_lowercase(),
        input: token.to_string(),
    };

    match field {
        Field::Instrument => {
            let value = token.strip_prefix("coin:").ok_or_else(mismatch)?;
            if value == "custom" {
                return Ok(ChoiceApplied::NeedText);
            }
            draft.instrument = Some(value.to_string());
        }
        Field::Timeframe => {
            let value = token.strip_prefix("tf:").ok_or_else(mismatch)?;
            draft.timeframe = Some(value.to_string());
        }
        Field::EntryFee | Field::ExitFee => {
            let value = token.strip_prefix("fee:").ok_or_else(mismatch)?;
            if value == "custom" {
                return Ok(ChoiceApplied::NeedText);
            }
            let fee = draft::parse_fee(field.label(), value)?;
            match field {
                Field::EntryFee => draft.entry_fee_pct = Some(fee),
                _ => draft.exit_fee_pct = Some(fee),
            }
        }
        Field::Status => {
            let value = token.strip_prefix("status:").ok_or_else(mismatch)?;
            draft.status = Some(match value {
                "open" => DraftStatus::Open,
                "target" => DraftStatus::ClosedTarget,
                "stop" => DraftStatus::ClosedStop,
                "manual" => DraftStatus::ClosedManual,
                _ => return Err(mismatch()),
            });
        }
        // Free-text-only fields never offer buttons
        _ => return Err(mismatch()),
    }
    Ok(ChoiceApplied::Done)
}

fn prompt_for(field: Field) -> Reply {
    Reply::with_choices(field.prompt(), menus::field_menu(field))
}

fn hub_reply(draft: &TradeDraft) -> Reply {
    let mut text = String::from("📝 Trade draft:\n");
    for field in draft.menu_fields() {
        text.push_str(&format!("{}: {}\n", field.label(), draft.display_value(field)));
    }
    text.push_str("\nPick a field to set, then save.");

    let mut choices: Vec<Choice> = draft
        .menu_fields()
        .iter()
        .map(|f| Choice::new(f.label(), f.token()))
        .collect();
    choices.push(Choice::new("💾 Save", "save"));
    choices.push(Choice::new("✖ Cancel", "cancel"));
    Reply::with_choices(text, choices)
}

fn stats_menu() -> Reply {
    Reply::with_choices(
        "📊 Statistics: pick a window",
        vec![
            Choice::new("All time", "stats:all"),
            Choice::new("Last 7 days", "stats:7"),
            Choice::new("Last 30 days", "stats:30"),
            Choice::new("By instrument", "stats:instruments"),
        ],
    )
}

fn parse_range(rest: &str) -> Result<(NaiveDate, NaiveDate)> {
    let bad = || JournalError::InputFormat {
        what: "a date range (YYYY-MM-DD:YYYY-MM-DD)".to_string(),
        input: rest.to_string(),
    };
    let (start, end) = rest.split_once(':').ok_or_else(bad)?;
    let start: NaiveDate = start.parse().map_err(|_| bad())?;
    let end: NaiveDate = end.parse().map_err(|_| bad())?;
    Ok((start, end))
}

fn hint() -> Reply {
    Reply::text(
        "Commands:\n\
         /newtrade - record a trade\n\
         /open - list open trades\n\
         /closetrade - close an open trade\n\
         /stats - statistics\n\
         /export - export the journal\n\
         /cancel - abort the current flow",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn journal() -> Journal {
        let store = Arc::new(TradeStore::open_in_memory().unwrap());
        Journal::new(store, Config::default())
    }

    fn text(journal: &Journal, s: &str) -> Reply {
        journal.handle(&Event {
            user_id: 1,
            chat_id: 1,
            kind: EventKind::Text { text: s.to_string() },
        })
    }

    fn tap(journal: &Journal, token: &str) -> Reply {
        journal.handle(&Event {
            user_id: 1,
            chat_id: 1,
            kind: EventKind::Choice { token: token.to_string() },
        })
    }

    fn has_token(reply: &Reply, token: &str) -> bool {
        reply.choices.iter().any(|c| c.token == token)
    }

    fn seed_open_trade(journal: &Journal, user_id: i64) -> i64 {
        journal
            .store
            .create(&NewTrade {
                user_id,
                chat_id: 1,
                instrument: "ETH/USDT".to_string(),
                timeframe: Some("4H".to_string()),
                entry_price: dec!(2000),
                targets: Some("2500 / 2700".to_string()),
                stop: Some(dec!(1800)),
                position_size: dec!(1000),
                entry_fee_pct: dec!(0.1),
                reason: None,
                tags: None,
                comment: None,
                close: None,
            })
            .unwrap()
    }

    fn fill_basics(journal: &Journal) {
        text(journal, "/newtrade");
        tap(journal, "field:instrument");
        tap(journal, "coin:ETH/USDT");
        tap(journal, "field:entry_price");
        text(journal, "2000");
        tap(journal, "field:position_size");
        text(journal, "1000");
        tap(journal, "field:entry_fee");
        tap(journal, "fee:0.1");
    }

    #[test]
    fn test_entry_flow_records_open_trade() {
        let journal = journal();
        let hub = text(&journal, "/newtrade");
        assert!(has_token(&hub, "save"));
        assert!(has_token(&hub, "field:instrument"));

        fill_basics(&journal);
        tap(&journal, "field:status");
        let hub = tap(&journal, "status:open");
        assert!(hub.text.contains("In position"));

        let confirm = tap(&journal, "save");
        assert!(confirm.text.contains("ETH/USDT"));
        assert!(has_token(&confirm, "confirm"));

        let saved = tap(&journal, "confirm");
        assert!(saved.text.contains("saved"));

        let open = journal.store.get_open_trades(1).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].instrument, "ETH/USDT");
        assert_eq!(open[0].status, TradeStatus::Open);
    }

    #[test]
    fn test_finalize_with_missing_fields_keeps_editing() {
        let journal = journal();
        text(&journal, "/newtrade");
        tap(&journal, "field:instrument");
        tap(&journal, "coin:ETH/USDT");

        let reply = tap(&journal, "save");
        assert!(reply.text.contains("Entry price"));
        assert!(reply.text.contains("Status"));
        assert!(!reply.text.contains("Instrument,"));
        // Still on the hub: fields remain selectable and nothing persisted
        assert!(has_token(&reply, "field:entry_price"));
        assert!(journal.store.get_open_trades(1).unwrap().is_empty());

        // The check is idempotent
        let again = tap(&journal, "save");
        assert!(again.text.contains("Entry price"));
    }

    #[test]
    fn test_malformed_number_reprompts_same_step() {
        let journal = journal();
        text(&journal, "/newtrade");
        tap(&journal, "field:entry_price");

        let reply = text(&journal, "cheap");
        assert!(reply.text.contains("expected"));
        assert!(reply.text.contains("Entry price ($):"));

        // Same step still accepts a valid value
        let hub = text(&journal, "2000");
        assert!(hub.text.contains("Entry price: 2000"));
        assert!(has_token(&hub, "save"));
    }

    #[test]
    fn test_target_close_derives_price_and_default_fee() {
        let journal = journal();
        fill_basics(&journal);
        tap(&journal, "field:targets");
        text(&journal, "2500 / 2700");
        tap(&journal, "field:status");
        tap(&journal, "status:target");

        tap(&journal, "save");
        tap(&journal, "confirm");

        let closed = journal.store.get_closed_trades(1).unwrap();
        assert_eq!(closed.len(), 1);
        let trade = &closed[0];
        assert_eq!(trade.close_price, Some(dec!(2500)));
        assert_eq!(trade.exit_fee_pct, Some(dec!(0.18)));
        assert_eq!(trade.close_reason, Some(CloseReason::Target));
        // units 0.4995, proceeds 1246.50225
        assert_eq!(trade.profit, Some(dec!(246.50)));
        assert_eq!(trade.pnl_pct, Some(dec!(24.65)));
        assert!(trade.closed_at.is_some());
    }

    #[test]
    fn test_stop_close_uses_stop_price() {
        let journal = journal();
        fill_basics(&journal);
        tap(&journal, "field:stop");
        text(&journal, "1800");
        tap(&journal, "field:status");
        tap(&journal, "status:stop");

        tap(&journal, "save");
        tap(&journal, "confirm");

        let closed = journal.store.get_closed_trades(1).unwrap();
        assert_eq!(closed[0].close_price, Some(dec!(1800)));
        assert_eq!(closed[0].close_reason, Some(CloseReason::Stop));
    }

    #[test]
    fn test_manual_status_chains_close_fields() {
        let journal = journal();
        fill_basics(&journal);
        tap(&journal, "field:status");

        let price_prompt = tap(&journal, "status:manual");
        assert!(price_prompt.text.contains("Close price"));

        let fee_prompt = text(&journal, "2200");
        assert!(fee_prompt.text.contains("Exit fee"));

        let hub = tap(&journal, "fee:0.18");
        assert!(hub.text.contains("Close price: 2200"));

        tap(&journal, "save");
        tap(&journal, "confirm");

        let closed = journal.store.get_closed_trades(1).unwrap();
        assert_eq!(closed[0].close_reason, Some(CloseReason::Manual));
        assert_eq!(closed[0].profit, Some(dec!(96.92)));
        assert_eq!(closed[0].pnl_pct, Some(dec!(9.69)));
    }

    #[test]
    fn test_close_flow_end_to_end() {
        let journal = journal();
        let id = seed_open_trade(&journal, 1);

        let pick = text(&journal, "/closetrade");
        assert!(has_token(&pick, &format!("close:{id}")));

        let price_prompt = tap(&journal, &format!("close:{id}"));
        assert!(price_prompt.text.contains("Close price"));

        let fee_prompt = text(&journal, "2200");
        assert!(has_token(&fee_prompt, "fee:0.18"));

        let confirm = tap(&journal, "fee:0.18");
        assert!(confirm.text.contains("96.92"));

        let done = tap(&journal, "confirm");
        assert!(done.text.contains("96.92"));
        assert!(done.text.contains("9.69"));

        let trade = journal.store.get_trade(id, 1).unwrap();
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.profit, Some(dec!(96.92)));

        let none_left = text(&journal, "/closetrade");
        assert!(none_left.text.contains("no open trades"));
    }

    #[test]
    fn test_close_flow_vanished_trade_aborts_to_menu() {
        let journal = journal();
        let id = seed_open_trade(&journal, 1);
        text(&journal, "/closetrade");

        // Trade gets closed underneath the flow
        journal
            .store
            .close_by_id(
                id,
                1,
                &CloseOutcome {
                    close_price: dec!(2100),
                    exit_fee_pct: dec!(0.18),
                    profit: dec!(47),
                    pnl_pct: dec!(4.7),
                    reason: CloseReason::Manual,
                },
            )
            .unwrap();

        let reply = tap(&journal, &format!("close:{id}"));
        assert!(reply.text.contains("not found or already closed"));
        // Sub-flow aborted: back to the safe menu state
        assert!(journal.sessions.is_empty());
    }

    #[test]
    fn test_cancel_discards_draft() {
        let journal = journal();
        text(&journal, "/newtrade");
        tap(&journal, "field:instrument");
        tap(&journal, "coin:ETH/USDT");

        let reply = text(&journal, "/cancel");
        assert!(reply.text.contains("Cancelled"));
        assert!(journal.sessions.is_empty());
        assert!(journal.store.get_open_trades(1).unwrap().is_empty());

        let nothing = text(&journal, "/cancel");
        assert!(nothing.text.contains("Nothing to cancel"));
    }

    #[test]
    fn test_custom_instrument_escapes_to_free_text() {
        let journal = journal();
        text(&journal, "/newtrade");
        tap(&journal, "field:instrument");

        let prompt = tap(&journal, "coin:custom");
        assert!(prompt.text.contains("Instrument"));

        let hub = text(&journal, "PEPE/USDT");
        assert!(hub.text.contains("PEPE/USDT"));
    }

    #[test]
    fn test_stats_windows_and_instrument_drilldown() {
        let journal = journal();
        let first = seed_open_trade(&journal, 1);
        let second = seed_open_trade(&journal, 1);
        journal
            .store
            .close_by_id(
                first,
                1,
                &CloseOutcome {
                    close_price: dec!(2200),
                    exit_fee_pct: dec!(0.18),
                    profit: dec!(96.92),
                    pnl_pct: dec!(9.69),
                    reason: CloseReason::Target,
                },
            )
            .unwrap();
        journal
            .store
            .close_by_id(
                second,
                1,
                &CloseOutcome {
                    close_price: dec!(1800),
                    exit_fee_pct: dec!(0.18),
                    profit: dec!(-101.77),
                    pnl_pct: dec!(-10.18),
                    reason: CloseReason::Stop,
                },
            )
            .unwrap();

        let menu = text(&journal, "/stats");
        assert!(has_token(&menu, "stats:all"));

        let all = tap(&journal, "stats:all");
        assert!(all.text.contains("Trades: 2"));
        assert!(all.text.contains("Winrate: 50.0%"));

        let window = tap(&journal, "stats:30");
        assert!(window.text.contains("Trades: 2"));

        let instruments = tap(&journal, "stats:instruments");
        assert!(has_token(&instruments, "istat:ETH/USDT"));

        let eth = tap(&journal, "istat:ETH/USDT");
        assert!(eth.text.contains("ETH/USDT"));
        assert!(eth.text.contains("Trades: 2"));
        assert!(eth.text.contains("Last close:"));

        let ranged = tap(&journal, "range:1970-01-01:2999-12-31");
        assert!(ranged.text.contains("Trades: 2"));

        let empty = tap(&journal, "range:1970-01-01:1970-01-02");
        assert!(empty.text.contains("No closed trades"));

        let bad = tap(&journal, "range:yesterday");
        assert!(bad.text.contains("expected"));
    }

    #[test]
    fn test_stats_empty_journal() {
        let journal = journal();
        let reply = tap(&journal, "stats:all");
        assert!(reply.text.contains("No closed trades"));
    }

    #[test]
    fn test_users_are_isolated() {
        let journal = journal();
        seed_open_trade(&journal, 2);

        // User 1 sees nothing of user 2's journal
        let reply = text(&journal, "/open");
        assert!(reply.text.contains("no open trades"));
    }

    #[test]
    fn test_unknown_text_outside_session_hints_commands() {
        let journal = journal();
        let reply = text(&journal, "hello there");
        assert!(reply.text.contains("/newtrade"));
        assert!(journal.sessions.is_empty());
    }
}
