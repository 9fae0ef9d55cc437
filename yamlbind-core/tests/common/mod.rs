#![allow(dead_code)]
//! Shared schemas and allocators for yamlbind-core integration tests.

use yamlbind_core::{
    load_data, Addr, Allocator, Config, Error, Field, Heap, Loaded, Memory, Ptr, Result, Schema,
    UNLIMITED,
};

/// Layout of the device record used across tests:
///
/// ```text
/// struct device {
///     char    *name;      //  0
///     uint16_t id;        //  8
///     uint8_t  kind;      // 10  enum
///     uint8_t  caps;      // 11  flags
///     uint16_t mode;      // 12  bitfield
///     double   gain;      // 16
///     struct { int32_t x, y; } pos;  // 24
///     char     label[8];  // 32  optional
///     uint32_t *ports;    // 40
///     uint8_t  n_ports;   // 48
///     uint8_t  rgb[3];    // 49
///     bool     armed;     // 52
///     char   **tags;      // 56  optional
///     uint32_t n_tags;    // 64
/// };                      // 72
/// ```
pub const DEVICE_SIZE: u32 = 72;

pub fn device_fields() -> Vec<Field> {
    vec![
        Field::new("name", 0, Schema::string(1, 32)),
        Field::new("id", 8, Schema::uint(2)),
        Field::new(
            "kind",
            10,
            Schema::enumeration(1, [("synth", 0), ("sampler", 1), ("bus", 2)]),
        ),
        Field::new(
            "caps",
            11,
            Schema::flags(1, [("midi", 1), ("audio", 2), ("osc", 4)]).flow(),
        ),
        Field::new("mode", 12, Schema::bitfield(2, [("channel", 0, 4), ("bank", 4, 4)])),
        Field::new("gain", 16, Schema::float(8)),
        Field::new(
            "pos",
            24,
            Schema::mapping(
                8,
                vec![
                    Field::new("x", 0, Schema::int(4)),
                    Field::new("y", 4, Schema::int(4)),
                ],
            )
            .flow(),
        ),
        Field::new("label", 32, Schema::string_inline(0, 8).optional()),
        Field::sequence(
            "ports",
            40,
            48,
            1,
            Schema::sequence(Schema::uint(4), 0, 8).pointer(),
        ),
        Field::new("rgb", 49, Schema::sequence_fixed(Schema::uint(1), 3).flow()),
        Field::new("armed", 52, Schema::boolean(1)),
        Field::sequence(
            "tags",
            56,
            64,
            4,
            Schema::sequence(Schema::string(0, UNLIMITED), 0, UNLIMITED)
                .pointer()
                .optional(),
        ),
    ]
}

pub fn device_schema() -> Schema {
    Schema::mapping(DEVICE_SIZE, device_fields()).pointer()
}

pub const DEVICE_YAML: &str = "\
name: lead
id: 300
kind: sampler
caps: [midi, osc]
mode: {channel: 0x3, bank: 0xA}
gain: 0.5
pos: {x: -4, y: 12}
label: main
ports: [1, 2, 70000]
rgb: [255, 128, 0]
armed: yes
tags:
- warm
- 'needs: review'
";

pub fn load_str(text: &str, config: &Config, heap: &mut Heap, schema: &Schema) -> Result<Loaded> {
    load_data(text.as_bytes(), config, heap, schema)
}

pub fn field(data: Ptr, offset: usize) -> Addr {
    Addr::new(data).add(offset)
}

/// Heap that fails the `n`th allocation or growing resize.
pub struct FailAfter {
    pub heap: Heap,
    remaining: usize,
}

impl FailAfter {
    pub fn new(n: usize) -> Self {
        Self {
            heap: Heap::new(),
            remaining: n,
        }
    }

    fn take(&mut self) -> Result<()> {
        if self.remaining == 0 {
            return Err(Error::Oom);
        }
        self.remaining -= 1;
        Ok(())
    }
}

impl Allocator for FailAfter {
    fn allocate(&mut self, size: usize) -> Result<Ptr> {
        self.take()?;
        self.heap.allocate(size)
    }

    fn resize(&mut self, ptr: Ptr, size: usize) -> Result<Ptr> {
        self.take()?;
        self.heap.resize(ptr, size)
    }

    fn release(&mut self, ptr: Ptr) {
        self.heap.release(ptr)
    }

    fn block(&self, ptr: Ptr) -> Result<&[u8]> {
        self.heap.block(ptr)
    }

    fn block_mut(&mut self, ptr: Ptr) -> Result<&mut [u8]> {
        self.heap.block_mut(ptr)
    }
}

/// Read a NUL-terminated string through a pointer slot.
pub fn string_at(heap: &Heap, slot: Addr) -> String {
    let ptr = heap.read_ptr(slot).unwrap();
    heap.read_str(Addr::new(ptr)).unwrap().to_string()
}
