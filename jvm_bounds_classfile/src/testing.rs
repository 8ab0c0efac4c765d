//! Minimal class-file assembler for tests.
//!
//! Produces just enough structure for [`ClassFile::parse`](crate::ClassFile::parse):
//! a constant pool, the class header, methods with optional `Code` and
//! `LineNumberTable` attributes, and an optional `SourceFile` attribute.

use std::collections::HashMap;

/// Body of a `Code` attribute.
#[derive(Debug, Clone, Default)]
pub struct MethodCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    /// `(start_pc, line_number)` rows.
    pub line_numbers: Vec<(u16, u16)>,
}

#[derive(Debug, Clone)]
struct MethodSpec {
    access_flags: u16,
    name: u16,
    descriptor: u16,
    code: Option<MethodCode>,
}

/// Builds class-file bytes in memory.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    pool: Vec<Vec<u8>>,
    interned: HashMap<Vec<u8>, u16>,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    source_file: Option<u16>,
    methods: Vec<MethodSpec>,
}

impl ClassBuilder {
    /// Starts a public class extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        let mut builder = Self {
            pool: Vec::new(),
            interned: HashMap::new(),
            access_flags: crate::access::ACC_PUBLIC,
            this_class: 0,
            super_class: 0,
            source_file: None,
            methods: Vec::new(),
        };
        builder.this_class = builder.class(name);
        builder.super_class = builder.class("java/lang/Object");
        builder
    }

    /// Replaces the superclass; `None` produces a root class.
    pub fn super_class(&mut self, name: Option<&str>) -> &mut Self {
        self.super_class = match name {
            Some(name) => self.class(name),
            None => 0,
        };
        self
    }

    pub fn access_flags(&mut self, flags: u16) -> &mut Self {
        self.access_flags = flags;
        self
    }

    pub fn source_file(&mut self, name: &str) -> &mut Self {
        self.source_file = Some(self.utf8(name));
        self
    }

    fn intern(&mut self, entry: Vec<u8>) -> u16 {
        if let Some(index) = self.interned.get(&entry) {
            return *index;
        }
        self.pool.push(entry.clone());
        let index = self.pool.len() as u16;
        self.interned.insert(entry, index);
        index
    }

    pub fn utf8(&mut self, text: &str) -> u16 {
        let mut entry = vec![1];
        entry.extend_from_slice(&(text.len() as u16).to_be_bytes());
        entry.extend_from_slice(text.as_bytes());
        self.intern(entry)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        let mut entry = vec![7];
        entry.extend_from_slice(&name_index.to_be_bytes());
        self.intern(entry)
    }

    pub fn string(&mut self, text: &str) -> u16 {
        let index = self.utf8(text);
        let mut entry = vec![8];
        entry.extend_from_slice(&index.to_be_bytes());
        self.intern(entry)
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend_from_slice(&value.to_be_bytes());
        self.intern(entry)
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut entry = vec![12];
        entry.extend_from_slice(&name.to_be_bytes());
        entry.extend_from_slice(&descriptor.to_be_bytes());
        self.intern(entry)
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let nat = self.name_and_type(name, descriptor);
        let mut entry = vec![tag];
        entry.extend_from_slice(&class.to_be_bytes());
        entry.extend_from_slice(&nat.to_be_bytes());
        self.intern(entry)
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(9, owner, name, descriptor)
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(10, owner, name, descriptor)
    }

    /// Declares a method. Pass `None` for native and abstract methods.
    pub fn method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        code: Option<MethodCode>,
    ) -> &mut Self {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.methods.push(MethodSpec {
            access_flags,
            name,
            descriptor,
            code,
        });
        self
    }

    /// Serializes the class. Attribute names are interned first so the pool
    /// is complete before it is written.
    pub fn build(&self) -> Vec<u8> {
        let mut this = self.clone();
        let code_name = this.utf8("Code");
        let lines_name = this.utf8("LineNumberTable");
        let source_name = if this.source_file.is_some() {
            Some(this.utf8("SourceFile"))
        } else {
            None
        };

        let mut out = Vec::new();
        out.extend_from_slice(&crate::MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&52u16.to_be_bytes());
        out.extend_from_slice(&((this.pool.len() + 1) as u16).to_be_bytes());
        for entry in &this.pool {
            out.extend_from_slice(entry);
        }
        out.extend_from_slice(&this.access_flags.to_be_bytes());
        out.extend_from_slice(&this.this_class.to_be_bytes());
        out.extend_from_slice(&this.super_class.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
        out.extend_from_slice(&0u16.to_be_bytes()); // fields

        out.extend_from_slice(&(this.methods.len() as u16).to_be_bytes());
        for method in &this.methods {
            out.extend_from_slice(&method.access_flags.to_be_bytes());
            out.extend_from_slice(&method.name.to_be_bytes());
            out.extend_from_slice(&method.descriptor.to_be_bytes());
            match &method.code {
                None => out.extend_from_slice(&0u16.to_be_bytes()),
                Some(code) => {
                    out.extend_from_slice(&1u16.to_be_bytes());
                    write_code(&mut out, code, code_name, lines_name);
                }
            }
        }

        match (this.source_file, source_name) {
            (Some(file), Some(name)) => {
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&name.to_be_bytes());
                out.extend_from_slice(&2u32.to_be_bytes());
                out.extend_from_slice(&file.to_be_bytes());
            }
            _ => out.extend_from_slice(&0u16.to_be_bytes()),
        }
        out
    }
}

fn write_code(out: &mut Vec<u8>, code: &MethodCode, code_name: u16, lines_name: u16) {
    let mut body = Vec::new();
    body.extend_from_slice(&code.max_stack.to_be_bytes());
    body.extend_from_slice(&code.max_locals.to_be_bytes());
    body.extend_from_slice(&(code.code.len() as u32).to_be_bytes());
    body.extend_from_slice(&code.code);
    body.extend_from_slice(&0u16.to_be_bytes()); // exception table
    if code.line_numbers.is_empty() {
        body.extend_from_slice(&0u16.to_be_bytes());
    } else {
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&lines_name.to_be_bytes());
        body.extend_from_slice(&(2 + 4 * code.line_numbers.len() as u32).to_be_bytes());
        body.extend_from_slice(&(code.line_numbers.len() as u16).to_be_bytes());
        for (start_pc, line) in &code.line_numbers {
            body.extend_from_slice(&start_pc.to_be_bytes());
            body.extend_from_slice(&line.to_be_bytes());
        }
    }

    out.extend_from_slice(&code_name.to_be_bytes());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
}
