//! Envelope assembly: groups the tokenized segment stream into the
//! interchange / functional group / transaction hierarchy, verifies control
//! number pairing, and dispatches each buffered transaction frame to the
//! parser registered for its set code.
//!
//! Out-of-order segments do not abort anything. The assembler reports an
//! `ENVELOPE_SEQUENCE_ERROR` and recovers locally by closing or opening
//! frames up to a plausible level, so a single pass yields as much of the
//! document and as many diagnostics as possible.

use crate::diagnostic::{codes, Diagnostic};
use crate::document::Document;
use crate::functional_group::FunctionalGroup;
use crate::handler::{ErrorHandler, ParseError};
use crate::interchange::Interchange;
use crate::registry::ParserRegistry;
use crate::segment::{Delimiters, RawSegment};
use crate::transaction::{Payload, Transaction, TransactionHeader};

struct PendingTransaction {
    header: TransactionHeader,
    /// Buffered frame, `ST` included.
    buffer: Vec<RawSegment>,
}

struct Assembler<'a> {
    registry: &'a ParserRegistry,
    delimiters: Delimiters,
    document: Document,
    interchange: Option<Interchange>,
    group: Option<FunctionalGroup>,
    transaction: Option<PendingTransaction>,
}

pub(crate) fn assemble(
    segments: Vec<RawSegment>,
    delimiters: Delimiters,
    registry: &ParserRegistry,
    handler: &mut ErrorHandler,
) -> Result<Document, ParseError> {
    let mut assembler = Assembler {
        registry,
        delimiters,
        document: Document::default(),
        interchange: None,
        group: None,
        transaction: None,
    };
    for segment in segments {
        assembler.accept(segment, handler)?;
    }
    assembler.finish(handler)
}

impl<'a> Assembler<'a> {
    fn accept(&mut self, segment: RawSegment, handler: &mut ErrorHandler) -> Result<(), ParseError> {
        match segment.tag.as_str() {
            "ISA" => self.open_interchange(segment, handler),
            "GS" => self.open_group(segment, handler),
            "ST" => self.open_transaction(segment, handler),
            "SE" => self.close_transaction(Some(&segment), handler),
            "GE" => self.close_group(Some(&segment), handler),
            "IEA" => self.close_interchange(Some(&segment), handler),
            _ => self.buffer(segment, handler),
        }
    }

    fn finish(mut self, handler: &mut ErrorHandler) -> Result<Document, ParseError> {
        if self.transaction.is_some() {
            self.sequence_error("input ended inside an open transaction", handler)?;
            self.close_transaction(None, handler)?;
        }
        if self.group.is_some() {
            self.sequence_error("input ended inside an open functional group", handler)?;
            self.close_group(None, handler)?;
        }
        if self.interchange.is_some() {
            self.sequence_error("input ended inside an open interchange", handler)?;
            self.close_interchange(None, handler)?;
        }
        Ok(self.document)
    }

    fn sequence_error(&mut self, message: &str, handler: &mut ErrorHandler) -> Result<(), ParseError> {
        tracing::warn!("envelope recovery: {}", message);
        handler.report(Diagnostic::warning(codes::ENVELOPE_SEQUENCE_ERROR, message))
    }

    fn open_interchange(
        &mut self,
        segment: RawSegment,
        handler: &mut ErrorHandler,
    ) -> Result<(), ParseError> {
        if self.transaction.is_some() || self.group.is_some() || self.interchange.is_some() {
            self.sequence_error("ISA encountered while a previous envelope was open", handler)?;
            if self.transaction.is_some() {
                self.close_transaction(None, handler)?;
            }
            if self.group.is_some() {
                self.close_group(None, handler)?;
            }
            if self.interchange.is_some() {
                self.close_interchange(None, handler)?;
            }
        }
        let interchange = Interchange::open(&segment);
        let control = &interchange.header.control_number;
        if !control.is_empty()
            && self
                .document
                .interchanges
                .iter()
                .any(|i| &i.header.control_number == control)
        {
            handler.report(
                Diagnostic::warning(
                    codes::DUPLICATE_CONTROL_NUMBER,
                    format!("interchange control number {} already used", control),
                )
                .with_value(control.clone()),
            )?;
        }
        self.interchange = Some(interchange);
        Ok(())
    }

    fn open_group(&mut self, segment: RawSegment, handler: &mut ErrorHandler) -> Result<(), ParseError> {
        if self.transaction.is_some() {
            self.sequence_error("GS encountered inside an open transaction", handler)?;
            self.close_transaction(None, handler)?;
        }
        if self.group.is_some() {
            self.sequence_error("GS encountered while a functional group was open", handler)?;
            self.close_group(None, handler)?;
        }
        if self.interchange.is_none() {
            self.sequence_error("GS encountered outside any interchange", handler)?;
            self.interchange = Some(Interchange::default());
        }
        let group = FunctionalGroup::open(&segment);
        let control = &group.header.control_number;
        if let Some(interchange) = &self.interchange {
            if !control.is_empty()
                && interchange
                    .functional_groups
                    .iter()
                    .any(|g| &g.header.control_number == control)
            {
                handler.report(
                    Diagnostic::warning(
                        codes::DUPLICATE_CONTROL_NUMBER,
                        format!("group control number {} already used", control),
                    )
                    .with_value(control.clone()),
                )?;
            }
        }
        self.group = Some(group);
        Ok(())
    }

    fn open_transaction(
        &mut self,
        segment: RawSegment,
        handler: &mut ErrorHandler,
    ) -> Result<(), ParseError> {
        if self.transaction.is_some() {
            self.sequence_error("ST encountered inside an open transaction", handler)?;
            self.close_transaction(None, handler)?;
        }
        if self.group.is_none() {
            self.sequence_error("ST encountered outside any functional group", handler)?;
            if self.interchange.is_none() {
                self.interchange = Some(Interchange::default());
            }
            self.group = Some(FunctionalGroup::default());
        }
        let header = TransactionHeader::from_st(&segment);
        if let Some(group) = &self.group {
            if !header.control_number.is_empty()
                && group
                    .transactions
                    .iter()
                    .any(|t| t.header.control_number == header.control_number)
            {
                handler.report(
                    Diagnostic::warning(
                        codes::DUPLICATE_CONTROL_NUMBER,
                        format!(
                            "transaction control number {} already used",
                            header.control_number
                        ),
                    )
                    .with_value(header.control_number.clone()),
                )?;
            }
        }
        self.transaction = Some(PendingTransaction {
            header,
            buffer: vec![segment],
        });
        Ok(())
    }

    fn close_transaction(
        &mut self,
        trailer: Option<&RawSegment>,
        handler: &mut ErrorHandler,
    ) -> Result<(), ParseError> {
        let mut pending = match self.transaction.take() {
            Some(pending) => pending,
            None => {
                return self.sequence_error("SE encountered outside any transaction", handler);
            }
        };
        if let Some(trailer) = trailer {
            // The SE count includes ST and SE themselves.
            let buffered = pending.buffer.len() + 1;
            match trailer.element(1).parse::<usize>() {
                Ok(claimed) if claimed != buffered => {
                    handler.report(
                        Diagnostic::info(
                            codes::SEGMENT_COUNT_MISMATCH,
                            format!("SE claims {} segments, counted {}", claimed, buffered),
                        )
                        .with_value(trailer.element(1)),
                    )?;
                }
                _ => {}
            }
            let closing = trailer.element(2);
            if closing != pending.header.control_number {
                handler.report(
                    Diagnostic::warning(
                        codes::CONTROL_NUMBER_MISMATCH,
                        format!(
                            "SE control number {} does not match ST control number {}",
                            closing, pending.header.control_number
                        ),
                    )
                    .with_value(closing),
                )?;
            }
            pending.buffer.push(trailer.clone());
        }
        let transaction = self.dispatch(pending, handler)?;
        match self.group.as_mut() {
            Some(group) => group.transactions.push(transaction),
            None => {
                // Recovery paths guarantee a group before a transaction
                // opens, so this only guards internal misuse.
                self.sequence_error("transaction closed outside any functional group", handler)?;
            }
        }
        Ok(())
    }

    /// Select the parser for the frame's set code and produce the typed
    /// transaction. Unknown codes and failed envelope checks degrade to an
    /// untyped payload retaining the buffered segments.
    fn dispatch(
        &mut self,
        pending: PendingTransaction,
        handler: &mut ErrorHandler,
    ) -> Result<Transaction, ParseError> {
        let PendingTransaction { header, buffer } = pending;
        let untyped = |buffer: Vec<RawSegment>| {
            buffer
                .into_iter()
                .filter(|s| !s.is("ST") && !s.is("SE"))
                .collect::<Vec<_>>()
        };
        match self.registry.lookup(&header.set_code) {
            Some(parser) => {
                if !parser.validate_envelope(&buffer) {
                    handler.report(
                        Diagnostic::error(
                            codes::MISSING_REQUIRED_SEGMENT,
                            format!(
                                "transaction {} is missing its mandatory opening segments",
                                header.set_code
                            ),
                        )
                        .with_value(header.set_code.clone()),
                    )?;
                    return Ok(Transaction {
                        header,
                        payload: Payload::Untyped,
                        segments: untyped(buffer),
                    });
                }
                let parsed = parser.parse(&buffer, self.delimiters, handler)?;
                debug_assert!(
                    parsed.payload.matches_set_code(&header.set_code),
                    "parser produced a payload variant for a different set code"
                );
                Ok(Transaction {
                    header,
                    payload: parsed.payload,
                    segments: parsed.extra_segments,
                })
            }
            None => {
                handler.report(
                    Diagnostic::error(
                        codes::UNKNOWN_TRANSACTION_CODE,
                        format!("no parser registered for transaction code {}", header.set_code),
                    )
                    .with_value(header.set_code.clone()),
                )?;
                Ok(Transaction {
                    header,
                    payload: Payload::Untyped,
                    segments: untyped(buffer),
                })
            }
        }
    }

    fn close_group(
        &mut self,
        trailer: Option<&RawSegment>,
        handler: &mut ErrorHandler,
    ) -> Result<(), ParseError> {
        if self.transaction.is_some() {
            self.sequence_error("GE encountered inside an open transaction", handler)?;
            self.close_transaction(None, handler)?;
        }
        let group = match self.group.take() {
            Some(group) => group,
            None => {
                return self.sequence_error("GE encountered outside any functional group", handler);
            }
        };
        if let Some(trailer) = trailer {
            match trailer.element(1).parse::<usize>() {
                Ok(claimed) if claimed != group.transactions.len() => {
                    handler.report(
                        Diagnostic::info(
                            codes::SEGMENT_COUNT_MISMATCH,
                            format!(
                                "GE claims {} transactions, counted {}",
                                claimed,
                                group.transactions.len()
                            ),
                        )
                        .with_value(trailer.element(1)),
                    )?;
                }
                _ => {}
            }
            let closing = trailer.element(2);
            if closing != group.header.control_number {
                handler.report(
                    Diagnostic::warning(
                        codes::CONTROL_NUMBER_MISMATCH,
                        format!(
                            "GE control number {} does not match GS control number {}",
                            closing, group.header.control_number
                        ),
                    )
                    .with_value(closing),
                )?;
            }
        }
        match self.interchange.as_mut() {
            Some(interchange) => interchange.functional_groups.push(group),
            None => {
                self.sequence_error("functional group closed outside any interchange", handler)?;
            }
        }
        Ok(())
    }

    fn close_interchange(
        &mut self,
        trailer: Option<&RawSegment>,
        handler: &mut ErrorHandler,
    ) -> Result<(), ParseError> {
        if self.transaction.is_some() {
            self.sequence_error("IEA encountered inside an open transaction", handler)?;
            self.close_transaction(None, handler)?;
        }
        if self.group.is_some() {
            self.sequence_error("IEA encountered inside an open functional group", handler)?;
            self.close_group(None, handler)?;
        }
        let interchange = match self.interchange.take() {
            Some(interchange) => interchange,
            None => {
                return self.sequence_error("IEA encountered outside any interchange", handler);
            }
        };
        if let Some(trailer) = trailer {
            match trailer.element(1).parse::<usize>() {
                Ok(claimed) if claimed != interchange.functional_groups.len() => {
                    handler.report(
                        Diagnostic::info(
                            codes::SEGMENT_COUNT_MISMATCH,
                            format!(
                                "IEA claims {} functional groups, counted {}",
                                claimed,
                                interchange.functional_groups.len()
                            ),
                        )
                        .with_value(trailer.element(1)),
                    )?;
                }
                _ => {}
            }
            let closing = trailer.element(2);
            if closing != interchange.header.control_number {
                handler.report(
                    Diagnostic::warning(
                        codes::CONTROL_NUMBER_MISMATCH,
                        format!(
                            "IEA control number {} does not match ISA control number {}",
                            closing, interchange.header.control_number
                        ),
                    )
                    .with_value(closing),
                )?;
            }
        }
        self.document.interchanges.push(interchange);
        Ok(())
    }

    /// Non-envelope segments buffer into the innermost open scope.
    fn buffer(&mut self, segment: RawSegment, handler: &mut ErrorHandler) -> Result<(), ParseError> {
        if let Some(transaction) = self.transaction.as_mut() {
            transaction.buffer.push(segment);
        } else if let Some(group) = self.group.as_mut() {
            group.trailing.push(segment);
        } else if let Some(interchange) = self.interchange.as_mut() {
            interchange.trailing.push(segment);
        } else {
            self.sequence_error(
                &format!("segment {} encountered outside any envelope", segment.tag),
                handler,
            )?;
        }
        Ok(())
    }
}
