/*
 * rumtk attempts to implement HL7 and medical protocols for interoperability in medicine.
 * This toolkit aims to be reliable, simple, performant, and standards compliant.
 * Copyright (C) 2025  Luis M. Santos, M.D.
 *
 * This library is free software; you can redistribute it and/or
 * modify it under the terms of the GNU Lesser General Public
 * License as published by the Free Software Foundation; either
 * version 2.1 of the License, or (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
 * Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public
 * License along with this library; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301  USA
 */

///
/// Inbound message dispatch: a read-only table, built once at startup and keyed by
/// (message-type, trigger-event), mapping each HL7 message the gateway accepts to the worklist
/// or patient-cache mutation it implies. No lock guards the table itself -- it never changes
/// after construction, so every inbound session reads it concurrently for free.
///
pub mod registry {
    use crate::mapper::mapper::{
        map_a40_merge_ids, map_orm_to_order_intent, map_siu_to_order_intent, xpn_to_patient_name,
        OrderIntent,
    };
    use crate::mwl::mwl::MwlStore;
    use crate::patient_cache::patient_cache::{PatientCache, PatientDemographics};
    use rumtk_core::cache::RUMCache;
    use rumtk_core::core::{GatewayError, RUMResult};
    use rumtk_core::strings::RUMString;
    use rumtk_hl7_v2::hl7_v2_builder::v2_builder::{build_ack, build_ae, build_nak};
    use rumtk_hl7_v2::hl7_v2_parser::v2_parser::V2Message;
    use rumtk_hl7_v2::hl7_v2_validator::{dispatch_key, validate};
    use rumtk_mllp::session::{SessionContext, SessionHandler};
    use std::future::Future;
    use std::sync::Arc;

    /// Shared state every inbound handler may touch, built once and handed to every session.
    pub struct HandlerContext {
        pub mwl: Arc<dyn MwlStore>,
        pub patients: Arc<PatientCache>,
    }

    fn field_str<'a>(message: &'a V2Message, segment: &str, field: isize) -> Option<&'a str> {
        message
            .get(segment, 1)
            .ok()
            .and_then(|seg| seg.get(field).ok())
            .map(|c| c.as_str())
    }

    /// One inbound message type's handling logic. `Ok(())` produces an `AA` ack; an `Err` whose
    /// kind is [rumtk_core::core::ErrorKind::Validation] produces an `AR`, anything else an `AE`.
    pub trait MessageHandler: Send + Sync {
        fn handle(&self, message: &V2Message, ctx: &HandlerContext) -> RUMResult<()>;
    }

    struct OrmHandler;
    impl MessageHandler for OrmHandler {
        fn handle(&self, message: &V2Message, ctx: &HandlerContext) -> RUMResult<()> {
            match map_orm_to_order_intent(message)? {
                OrderIntent::New(entry) => ctx.mwl.add(entry),
                OrderIntent::Update(entry) => ctx.mwl.update(entry.accession.as_str(), entry.clone()),
                OrderIntent::Cancel { accession } => ctx.mwl.cancel(&accession),
                OrderIntent::Discontinue { accession } => ctx.mwl.cancel(&accession),
            }
        }
    }

    struct SiuHandler {
        trigger: &'static str,
    }
    impl MessageHandler for SiuHandler {
        fn handle(&self, message: &V2Message, ctx: &HandlerContext) -> RUMResult<()> {
            match map_siu_to_order_intent(message, self.trigger)? {
                OrderIntent::New(entry) => ctx.mwl.add(entry),
                OrderIntent::Update(entry) => ctx.mwl.update(entry.accession.as_str(), entry.clone()),
                OrderIntent::Cancel { accession } => ctx.mwl.cancel(&accession),
                OrderIntent::Discontinue { accession } => ctx.mwl.cancel(&accession),
            }
        }
    }

    /// ADT A01/A04/A08: refreshes cached demographics for the patient named in PID.
    struct AdtDemographicsHandler;
    impl MessageHandler for AdtDemographicsHandler {
        fn handle(&self, message: &V2Message, ctx: &HandlerContext) -> RUMResult<()> {
            let patient_id = field_str(message, "PID", 3)
                .ok_or_else(|| GatewayError::mapping("ADT message missing PID-3"))?;
            let raw_name = field_str(message, "PID", 5).unwrap_or("");
            ctx.patients.upsert(PatientDemographics {
                patient_id: RUMString::from(patient_id),
                name: xpn_to_patient_name(raw_name, '^'),
                birth_date: RUMString::from(field_str(message, "PID", 7).unwrap_or("")),
                sex: RUMString::from(field_str(message, "PID", 8).unwrap_or("")),
            });
            Ok(())
        }
    }

    /// ADT A40: merges a prior patient id (MRG-1) into the surviving one (PID-3), rewriting both
    /// the patient cache and every matching MWL entry.
    struct AdtMergeHandler;
    impl MessageHandler for AdtMergeHandler {
        fn handle(&self, message: &V2Message, ctx: &HandlerContext) -> RUMResult<()> {
            let (surviving, merged) = map_a40_merge_ids(message)?;
            ctx.mwl.reassign_patient(&merged, &surviving)?;
            ctx.patients.merge(&merged, &surviving);
            Ok(())
        }
    }

    ///
    /// Built once at startup and shared read-only via [Arc]. `dispatch` validates, looks up the
    /// handler for the message's (type, trigger) pair, and returns the wire-ready ACK/NAK bytes
    /// -- callers never need to inspect `GatewayError` themselves to decide which ack code to
    /// send.
    ///
    pub struct HandlerRegistry {
        handlers: RUMCache<RUMString, Box<dyn MessageHandler>>,
    }

    impl HandlerRegistry {
        pub fn new() -> Self {
            let mut handlers: RUMCache<RUMString, Box<dyn MessageHandler>> = RUMCache::default();
            handlers.insert(RUMString::from("ADT^A01"), Box::new(AdtDemographicsHandler));
            handlers.insert(RUMString::from("ADT^A04"), Box::new(AdtDemographicsHandler));
            handlers.insert(RUMString::from("ADT^A08"), Box::new(AdtDemographicsHandler));
            handlers.insert(RUMString::from("ADT^A40"), Box::new(AdtMergeHandler));
            handlers.insert(RUMString::from("ORM^O01"), Box::new(OrmHandler));
            handlers.insert(RUMString::from("SIU^S12"), Box::new(SiuHandler { trigger: "S12" }));
            handlers.insert(RUMString::from("SIU^S13"), Box::new(SiuHandler { trigger: "S13" }));
            handlers.insert(RUMString::from("SIU^S14"), Box::new(SiuHandler { trigger: "S14" }));
            handlers.insert(RUMString::from("SIU^S15"), Box::new(SiuHandler { trigger: "S15" }));
            HandlerRegistry { handlers }
        }

        /// Validates, dispatches, and returns the raw ACK/NAK wire bytes to send back. A message
        /// type with no registered handler is accepted unconditionally (§4.11's pass-through
        /// default) so the gateway never NAKs a message it simply doesn't act on.
        pub fn dispatch(
            &self,
            message: &V2Message,
            ctx: &HandlerContext,
            timestamp: &str,
            control_id: &str,
        ) -> RUMResult<RUMString> {
            if let Err(e) = validate(message) {
                return build_nak(message, e.context(), timestamp, control_id);
            }
            let key = dispatch_key(message)?;
            match self.handlers.get(key.as_str()) {
                None => build_ack(message, timestamp, control_id),
                Some(handler) => match handler.handle(message, ctx) {
                    Ok(()) => build_ack(message, timestamp, control_id),
                    Err(e) => build_ae(message, &e.to_string(), timestamp, control_id),
                },
            }
        }
    }

    impl Default for HandlerRegistry {
        fn default() -> Self {
            Self::new()
        }
    }

    ///
    /// Adapts a [HandlerRegistry] to `rumtk_mllp`'s [SessionHandler] trait: parses each inbound
    /// frame as HL7, dispatches it, and frames the resulting ACK/NAK back. A frame that cannot
    /// even be parsed gets a best-effort generic `AE` built without an original message to mirror
    /// (HL7 has no well-formed "parse failed" peer to swap sender/receiver against).
    ///
    #[derive(Clone)]
    pub struct GatewayInboundHandler {
        registry: Arc<HandlerRegistry>,
        ctx: Arc<HandlerContext>,
        sending_app: RUMString,
        sending_facility: RUMString,
    }

    impl GatewayInboundHandler {
        pub fn new(
            registry: Arc<HandlerRegistry>,
            ctx: Arc<HandlerContext>,
            sending_app: impl Into<RUMString>,
            sending_facility: impl Into<RUMString>,
        ) -> Self {
            GatewayInboundHandler {
                registry,
                ctx,
                sending_app: sending_app.into(),
                sending_facility: sending_facility.into(),
            }
        }

        fn unparsable_nak(&self, timestamp: &str, control_id: &str, error: &str) -> RUMString {
            RUMString::from(
                format!(
                    "MSH|^~\\&|{}|{}|UNKNOWN|UNKNOWN|{}||ACK|{}|P|2.5.1\rMSA|AR||{}\r",
                    self.sending_app, self.sending_facility, timestamp, control_id, error
                )
                .as_str(),
            )
        }
    }

    impl SessionHandler for GatewayInboundHandler {
        fn handle(
            &self,
            payload: Vec<u8>,
            _session_ctx: &SessionContext,
        ) -> impl Future<Output = RUMResult<Option<Vec<u8>>>> + Send {
            let registry = self.registry.clone();
            let ctx = self.ctx.clone();
            let handler = self.clone();
            async move {
                let timestamp = rumtk_core::strings::format_compact!(
                    "{}",
                    chrono::Utc::now().format("%Y%m%d%H%M%S")
                );
                let control_id = rumtk_core::strings::format_compact!(
                    "{}",
                    chrono::Utc::now().timestamp_millis()
                );
                let raw = String::from_utf8_lossy(&payload);
                let response = match V2Message::from_str(&raw) {
                    Ok(message) => registry.dispatch(&message, &ctx, &timestamp, &control_id)?,
                    Err(e) => handler.unparsable_nak(&timestamp, &control_id, &e.to_string()),
                };
                Ok(Some(response.as_bytes().to_vec()))
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::mwl::mwl::InMemoryMwlStore;

        fn context() -> HandlerContext {
            HandlerContext {
                mwl: Arc::new(InMemoryMwlStore::new()),
                patients: Arc::new(PatientCache::default()),
            }
        }

        const ORM: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20250101120000||ORM^O01|MSG00001|P|2.5\rPID|||P-123^^^MRN||Smith^John||19700101|M\rORC|NW|ORD-1|FILL-1\rOBR|1|ORD-1|FILL-1|CT-HEAD^CT Head||||20250101130000\r";

        const ADT_A08: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20250101120000||ADT^A08|MSG00002|P|2.5\rPID|||P-200^^^MRN||Doe^Jane||19800202|F\r";

        #[test]
        fn test_orm_new_order_builds_mwl_entry_and_acks() {
            let ctx = context();
            let registry = HandlerRegistry::new();
            let message = V2Message::from_str(ORM).unwrap();
            let ack_wire = registry
                .dispatch(&message, &ctx, "20250101120100", "ACK1")
                .unwrap();
            let ack = V2Message::from_str(&ack_wire).unwrap();
            assert_eq!(ack.get("MSA", 1).unwrap().get(1).unwrap().as_str(), "AA");
            assert_eq!(ctx.mwl.get("ORD-1").unwrap().patient_id, "P-123");
        }

        #[test]
        fn test_adt_a08_updates_patient_cache() {
            let ctx = context();
            let registry = HandlerRegistry::new();
            let message = V2Message::from_str(ADT_A08).unwrap();
            registry
                .dispatch(&message, &ctx, "20250101120100", "ACK2")
                .unwrap();
            assert_eq!(ctx.patients.get("P-200").unwrap().name.family, "Doe");
        }

        #[test]
        fn test_storage_failure_produces_ae_ack() {
            let ctx = context();
            let registry = HandlerRegistry::new();
            let message = V2Message::from_str(ORM).unwrap();
            registry
                .dispatch(&message, &ctx, "20250101120100", "ACK1")
                .unwrap();
            // Re-processing the same NW order hits the duplicate-accession storage error.
            let ack_wire = registry
                .dispatch(&message, &ctx, "20250101120200", "ACK3")
                .unwrap();
            let ack = V2Message::from_str(&ack_wire).unwrap();
            assert_eq!(ack.get("MSA", 1).unwrap().get(1).unwrap().as_str(), "AE");
        }

        #[test]
        fn test_unknown_message_type_passes_through_as_aa() {
            let ctx = context();
            let registry = HandlerRegistry::new();
            let oru = "MSH|^~\\&|LAB|HOSP|BRIDGE|HOSP|20250101120000||ORU^R01|MSG00003|P|2.5\rPID|||P-1^^^MRN\rOBR|1\r";
            let message = V2Message::from_str(oru).unwrap();
            let ack_wire = registry
                .dispatch(&message, &ctx, "20250101120100", "ACK4")
                .unwrap();
            let ack = V2Message::from_str(&ack_wire).unwrap();
            assert_eq!(ack.get("MSA", 1).unwrap().get(1).unwrap().as_str(), "AA");
        }
    }
}
