// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{fs::File, os::unix::fs::FileExt};

use esfat_ds::BlockDevice;
use log::error;

/// A [`BlockDevice`] backed by a regular file, opened from `File::options`
/// for read/write. Intended for host-side testing and tooling against a
/// disk image file rather than a real SD card.
pub struct FileBlockDevice {
    file: File,
}

impl FileBlockDevice {
    pub fn open(path: &str) -> std::io::Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    pub fn from_file(file: File) -> Self {
        Self { file }
    }
}

impl BlockDevice for FileBlockDevice {
    fn read(&self, byte_offset: u64, buf: &mut [u8]) -> usize {
        match self.file.read_at(buf, byte_offset) {
            Ok(n) => n,
            Err(e) => {
                error!("read at {byte_offset}: {e}");
                0
            }
        }
    }

    fn write(&self, byte_offset: u64, buf: &[u8]) -> usize {
        match self.file.write_at(buf, byte_offset) {
            Ok(n) => n,
            Err(e) => {
                error!("write at {byte_offset}: {e}");
                0
            }
        }
    }
}
