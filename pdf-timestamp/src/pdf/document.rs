// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Document-level PDF handling: the object arena and the incremental
//! writer.

use {
    super::{
        object::{Dictionary, Object, ObjectId, Stream},
        parser,
    },
    crate::error::PdfTimestampError,
    log::{debug, warn},
    std::collections::{BTreeMap, BTreeSet},
};

type Result<T> = std::result::Result<T, PdfTimestampError>;

/// A loaded PDF document.
///
/// Loading scans the byte image for object definitions (see
/// [parser::scan_objects]), so the object-number counter is correct
/// even when the file carries stale cross-reference data from earlier
/// incremental revisions. Mutations never touch loaded state in place:
/// new and changed objects are marked dirty and written out as one
/// incremental revision by [PdfDocument::save_incremental].
pub struct PdfDocument {
    objects: BTreeMap<u32, (u16, Object)>,
    max_object_number: u32,
    dirty: BTreeSet<u32>,
    root: Option<ObjectId>,
    info: Option<Object>,
    prev_startxref: Option<usize>,
}

impl PdfDocument {
    pub fn load(data: &[u8]) -> Result<Self> {
        if !data.starts_with(b"%PDF-") {
            // Some producers prepend junk; the scan below doesn't care,
            // but flag it for diagnostics.
            warn!("input does not start with a %PDF header");
        }

        let mut objects: BTreeMap<u32, (u16, Object)> = BTreeMap::new();
        let mut max_object_number = 0u32;

        for scanned in parser::scan_objects(data) {
            max_object_number = max_object_number.max(scanned.id.number);

            // Object streams are expanded inline so their members land
            // in the arena in revision order: later definitions shadow
            // earlier ones either way.
            if let Object::Stream(stream) = &scanned.object {
                if stream.dict.type_name() == Some("ObjStm") {
                    match parser::expand_object_stream(stream) {
                        Ok(members) => {
                            for (number, object) in members {
                                max_object_number = max_object_number.max(number);
                                objects.insert(number, (0, object));
                            }
                        }
                        Err(e) => warn!("failed to expand object stream: {}", e),
                    }
                }
            }

            objects.insert(scanned.id.number, (scanned.id.generation, scanned.object));
        }

        if objects.is_empty() {
            return Err(PdfTimestampError::Pdf(
                "no objects found in input".to_string(),
            ));
        }

        let (root, info) = Self::find_root_and_info(data, &objects);

        Ok(Self {
            objects,
            max_object_number,
            dirty: BTreeSet::new(),
            root,
            info,
            prev_startxref: parser::last_startxref(data),
        })
    }

    fn find_root_and_info(
        data: &[u8],
        objects: &BTreeMap<u32, (u16, Object)>,
    ) -> (Option<ObjectId>, Option<Object>) {
        let mut root = None;
        let mut info = None;

        // Classic trailers, last one wins.
        for trailer in parser::trailer_dictionaries(data) {
            if let Some(reference) = trailer.get("Root").and_then(Object::as_reference) {
                root = Some(reference);
            }
            if let Some(value) = trailer.get("Info") {
                info = Some(value.clone());
            }
        }

        // Cross-reference streams double as trailers in 1.5+ files.
        if root.is_none() {
            for (_, (_, object)) in objects.iter() {
                if let Some(dict) = object.as_dict() {
                    if dict.type_name() == Some("XRef") {
                        if let Some(reference) = dict.get("Root").and_then(Object::as_reference) {
                            root = Some(reference);
                        }
                        if info.is_none() {
                            info = dict.get("Info").cloned();
                        }
                    }
                }
            }
        }

        // Last resort: any object whose dictionary says /Type /Catalog.
        if root.is_none() {
            root = objects.iter().rev().find_map(|(number, (generation, object))| {
                object
                    .as_dict()
                    .filter(|dict| dict.type_name() == Some("Catalog"))
                    .map(|_| ObjectId::new(*number, *generation))
            });
        }

        (root, info)
    }

    pub fn max_object_number(&self) -> u32 {
        self.max_object_number
    }

    /// Raise the object counter to cover definitions in `data`.
    ///
    /// Required before registering new objects against bytes that have
    /// grown since this instance was loaded; otherwise fresh numbers
    /// collide with numbers consumed by a later revision.
    pub fn lift_object_counter(&mut self, data: &[u8]) {
        let observed = parser::max_defined_object_number(data);

        if observed > self.max_object_number {
            debug!(
                "lifting object counter {} -> {}",
                self.max_object_number, observed
            );
            self.max_object_number = observed;
        }
    }

    pub fn object(&self, number: u32) -> Option<&Object> {
        self.objects.get(&number).map(|(_, object)| object)
    }

    pub fn object_mut(&mut self, number: u32) -> Option<&mut Object> {
        self.objects.get_mut(&number).map(|(_, object)| object)
    }

    /// Follow references until a direct object is reached.
    pub fn resolve<'a>(&'a self, object: &'a Object) -> &'a Object {
        static NULL: Object = Object::Null;

        let mut current = object;

        // Reference chains in real files are shallow; the bound only
        // guards against cycles.
        for _ in 0..32 {
            match current {
                Object::Reference(id) => match self.object(id.number) {
                    Some(target) => current = target,
                    None => return &NULL,
                },
                other => return other,
            }
        }

        &NULL
    }

    /// The dictionary behind an object number.
    pub fn dict(&self, id: ObjectId) -> Result<&Dictionary> {
        self.object(id.number)
            .and_then(Object::as_dict)
            .ok_or_else(|| {
                PdfTimestampError::Pdf(format!("object {} is not a dictionary", id.number))
            })
    }

    /// Register a new object under a fresh number. The object is marked
    /// for save.
    pub fn register(&mut self, object: Object) -> ObjectId {
        self.max_object_number += 1;
        let id = ObjectId::new(self.max_object_number, 0);

        self.objects.insert(id.number, (0, object));
        self.dirty.insert(id.number);

        id
    }

    /// Replace an existing object. The object is marked for save.
    pub fn set_object(&mut self, id: ObjectId, object: Object) {
        self.objects.insert(id.number, (id.generation, object));
        self.dirty.insert(id.number);
    }

    /// Mark an object for inclusion in the next incremental revision.
    ///
    /// Every mutated object must be marked, including the catalog on
    /// any catalog change; an unmarked mutation produces a revision
    /// whose `/Prev` chain no longer reaches the object, which readers
    /// report as a damaged file.
    pub fn mark_for_save(&mut self, id: ObjectId) {
        self.dirty.insert(id.number);
    }

    pub fn is_marked(&self, id: ObjectId) -> bool {
        self.dirty.contains(&id.number)
    }

    pub fn root_id(&self) -> Result<ObjectId> {
        self.root
            .ok_or_else(|| PdfTimestampError::Pdf("document has no catalog".to_string()))
    }

    pub fn catalog(&self) -> Result<&Dictionary> {
        self.dict(self.root_id()?)
    }

    pub fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        let id = self.root_id()?;

        self.object_mut(id.number)
            .and_then(Object::as_dict_mut)
            .ok_or_else(|| PdfTimestampError::Pdf("catalog is not a dictionary".to_string()))
    }

    /// The object id of the first page.
    pub fn first_page_id(&self) -> Result<ObjectId> {
        let catalog = self.catalog()?;

        let mut current = catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| PdfTimestampError::Pdf("catalog has no /Pages".to_string()))?;

        // Descend the page tree, always taking the first kid.
        for _ in 0..64 {
            let dict = self.dict(current)?;

            match dict.type_name() {
                Some("Page") => return Ok(current),
                _ => {
                    let kids = dict
                        .get("Kids")
                        .map(|kids| self.resolve(kids))
                        .and_then(Object::as_array)
                        .ok_or_else(|| {
                            PdfTimestampError::Pdf("page tree node has no /Kids".to_string())
                        })?;

                    current = kids
                        .first()
                        .and_then(Object::as_reference)
                        .ok_or_else(|| {
                            PdfTimestampError::Pdf("page tree /Kids is empty".to_string())
                        })?;
                }
            }
        }

        Err(PdfTimestampError::Pdf("page tree too deep".to_string()))
    }

    /// Register a stream over raw data and return its reference.
    pub fn register_stream(&mut self, data: Vec<u8>) -> ObjectId {
        self.register(Object::Stream(Stream::new(Dictionary::new(), data)))
    }

    /// Append one incremental revision containing every dirty object.
    ///
    /// The returned image starts with `original` verbatim; original
    /// bytes are never rewritten.
    pub fn save_incremental(&mut self, original: &[u8]) -> Result<Vec<u8>> {
        if self.dirty.is_empty() {
            return Err(PdfTimestampError::Pdf(
                "no objects marked for incremental save".to_string(),
            ));
        }

        let mut out = original.to_vec();

        if out.last() != Some(&b'\n') {
            out.push(b'\n');
        }

        // Body: every dirty object, ascending, offsets recorded for the
        // xref section.
        let mut offsets: BTreeMap<u32, (u16, usize)> = BTreeMap::new();

        for number in &self.dirty {
            let (generation, object) = self
                .objects
                .get(number)
                .ok_or_else(|| {
                    PdfTimestampError::Pdf(format!("dirty object {} missing from arena", number))
                })?;

            offsets.insert(*number, (*generation, out.len()));

            out.extend_from_slice(format!("{} {} obj\n", number, generation).as_bytes());
            object.write(&mut out);
            out.extend_from_slice(b"\nendobj\n");
        }

        // Cross-reference section: the free head plus one subsection
        // per contiguous run of dirty numbers.
        let xref_start = out.len();
        out.extend_from_slice(b"xref\n0 1\n0000000000 65535 f \n");

        let numbers: Vec<u32> = offsets.keys().copied().collect();
        let mut index = 0usize;

        while index < numbers.len() {
            let run_start = index;

            while index + 1 < numbers.len() && numbers[index + 1] == numbers[index] + 1 {
                index += 1;
            }

            out.extend_from_slice(
                format!("{} {}\n", numbers[run_start], index - run_start + 1).as_bytes(),
            );

            for number in &numbers[run_start..=index] {
                let (generation, offset) = offsets[number];
                out.extend_from_slice(format!("{:010} {:05} n \n", offset, generation).as_bytes());
            }

            index += 1;
        }

        // Trailer.
        let mut trailer = Dictionary::new();
        trailer.set("Size", Object::Integer(i64::from(self.max_object_number) + 1));
        trailer.set("Root", Object::Reference(self.root_id()?));
        if let Some(info) = &self.info {
            trailer.set("Info", info.clone());
        }
        if let Some(prev) = self.prev_startxref {
            trailer.set("Prev", Object::Integer(prev as i64));
        }

        out.extend_from_slice(b"trailer\n");
        trailer.write(&mut out);
        out.extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_start).as_bytes());

        // The next revision chains to the one just written.
        self.prev_startxref = Some(xref_start);
        self.dirty.clear();

        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::testutil::minimal_pdf};

    #[test]
    fn load_minimal() {
        let data = minimal_pdf();
        let doc = PdfDocument::load(&data).unwrap();

        assert_eq!(doc.max_object_number(), 3);
        assert_eq!(doc.root_id().unwrap(), ObjectId::new(1, 0));
        assert_eq!(doc.catalog().unwrap().type_name(), Some("Catalog"));
        assert_eq!(doc.first_page_id().unwrap(), ObjectId::new(3, 0));
    }

    #[test]
    fn incremental_save_appends_only() {
        let data = minimal_pdf();
        let mut doc = PdfDocument::load(&data).unwrap();

        let id = doc.register(Object::literal_string(b"added".to_vec()));
        assert_eq!(id.number, 4);

        let saved = doc.save_incremental(&data).unwrap();

        assert!(saved.starts_with(&data));
        assert!(saved.len() > data.len());

        let text = String::from_utf8_lossy(&saved);
        assert!(text.contains("4 0 obj"));
        assert!(text.contains("/Prev"));
        assert!(text.ends_with("%%EOF\n"));

        // The appended revision is loadable and shadows nothing.
        let reloaded = PdfDocument::load(&saved).unwrap();
        assert_eq!(reloaded.max_object_number(), 4);
        assert_eq!(
            reloaded.object(4),
            Some(&Object::literal_string(b"added".to_vec()))
        );
    }

    #[test]
    fn save_marks_required() {
        let data = minimal_pdf();
        let mut doc = PdfDocument::load(&data).unwrap();

        assert!(doc.save_incremental(&data).is_err());

        doc.mark_for_save(ObjectId::new(1, 0));
        assert!(doc.save_incremental(&data).is_ok());
    }

    #[test]
    fn counter_lifts_from_grown_bytes() {
        let data = minimal_pdf();
        let mut doc = PdfDocument::load(&data).unwrap();

        let mut grown = data.clone();
        grown.extend_from_slice(b"9 0 obj\n(late)\nendobj\n");

        doc.lift_object_counter(&grown);
        assert_eq!(doc.max_object_number(), 9);

        let id = doc.register(Object::Null);
        assert_eq!(id.number, 10);
    }

    #[test]
    fn xref_subsections_are_contiguous_runs() {
        let data = minimal_pdf();
        let mut doc = PdfDocument::load(&data).unwrap();

        // Mark 1 and register 4: two runs unless adjacent.
        doc.mark_for_save(ObjectId::new(1, 0));
        doc.register(Object::Null);

        let saved = doc.save_incremental(&data).unwrap();
        let text = String::from_utf8_lossy(&saved);

        let xref_at = text.rfind("xref\n").unwrap();
        let xref = &text[xref_at..];
        assert!(xref.contains("0 1\n0000000000 65535 f \n"));
        assert!(xref.contains("\n1 1\n"));
        assert!(xref.contains("\n4 1\n"));
    }
}
