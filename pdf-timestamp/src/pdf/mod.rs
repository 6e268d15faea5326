// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A minimal PDF primitive layer.
//!
//! Covers exactly what trusted timestamping needs: loading arbitrary
//! documents far enough to find the catalog, pages, form fields, and
//! signature dictionaries, and appending incremental revisions that
//! leave every original byte untouched.

pub mod document;
pub mod object;
pub mod parser;

pub use {
    document::PdfDocument,
    object::{Dictionary, Object, ObjectId, PdfString, Stream},
};
