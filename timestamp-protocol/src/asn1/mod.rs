// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ASN.1 data structures used by the Time-Stamp Protocol and its
//! supporting PKI machinery.
//!
//! The types are hand mapped onto `bcder` because timestamp tokens are
//! BER on the wire while the structures we emit (requests, OCSP
//! queries) must be strict DER. Every module follows the same shape:
//! recursive-descent `take_from` decoders and reverse-descent
//! `encode_ref` value builders.

pub mod rfc3161;
pub mod rfc5280;
pub mod rfc5652;
pub mod rfc6960;
