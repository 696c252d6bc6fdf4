//! Generators for process-unique ids
//!
//! An id handed out by a generator stays reserved until it is explicitly
//! released, so a wrapped-around counter never hands out an id that is
//! still referenced somewhere.

macro_rules! id_gen {
    ($mod_name:ident) => {
        mod $mod_name {
            use once_cell::sync::Lazy;
            use std::{collections::HashSet, sync::Mutex};

            struct IdData {
                in_use: HashSet<u64>,
                counter: u64,
            }

            static ID_DATA: Lazy<Mutex<IdData>> = Lazy::new(|| {
                Mutex::new(IdData {
                    in_use: HashSet::new(),
                    counter: 1,
                })
            });

            pub(crate) fn next() -> u64 {
                let data = &mut *ID_DATA.lock().unwrap();

                // 0 is never handed out
                while data.counter == 0 || !data.in_use.insert(data.counter) {
                    data.counter = data.counter.wrapping_add(1);
                }

                let new_id = data.counter;
                data.counter = data.counter.wrapping_add(1);

                new_id
            }

            pub(crate) fn release(id: u64) -> bool {
                ID_DATA.lock().unwrap().in_use.remove(&id)
            }

            #[allow(dead_code)]
            pub(crate) fn is_reserved(id: u64) -> bool {
                ID_DATA.lock().unwrap().in_use.contains(&id)
            }
        }
    };
}

pub(crate) use id_gen;
