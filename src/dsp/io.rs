//! Host buffer views handed to the kernel once per callback.

/// One channel's buffers for a callback. Input and output may alias.
pub enum ChannelIo<'a> {
    InPlace(&'a mut [f32]),
    Split { input: &'a [f32], output: &'a mut [f32] },
}

impl<'a> ChannelIo<'a> {
    #[inline]
    pub fn input(&self) -> &[f32] {
        match self {
            ChannelIo::InPlace(buf) => buf,
            ChannelIo::Split { input, .. } => input,
        }
    }

    #[inline]
    pub fn output(&mut self) -> &mut [f32] {
        match self {
            ChannelIo::InPlace(buf) => buf,
            ChannelIo::Split { output, .. } => output,
        }
    }

    pub fn is_in_place(&self) -> bool {
        matches!(self, ChannelIo::InPlace(_))
    }

    /// Samples addressable in both directions.
    pub fn len(&self) -> usize {
        match self {
            ChannelIo::InPlace(buf) => buf.len(),
            ChannelIo::Split { input, output } => input.len().min(output.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A set of per-channel buffers, indexed by channel number.
pub trait BlockIo {
    fn num_channels(&self) -> usize;
    fn channel(&mut self, index: usize) -> Option<ChannelIo<'_>>;
}

/// Host buffers processed in place (one slice per channel).
pub struct InPlaceBlock<'a, 'b> {
    channels: &'a mut [&'b mut [f32]],
}

impl<'a, 'b> InPlaceBlock<'a, 'b> {
    pub fn new(channels: &'a mut [&'b mut [f32]]) -> Self {
        Self { channels }
    }
}

impl BlockIo for InPlaceBlock<'_, '_> {
    fn num_channels(&self) -> usize {
        self.channels.len()
    }

    fn channel(&mut self, index: usize) -> Option<ChannelIo<'_>> {
        self.channels
            .get_mut(index)
            .map(|buf| ChannelIo::InPlace(&mut **buf))
    }
}

/// Separate input and output arrays per channel.
pub struct SplitBlock<'a, 'b> {
    inputs: &'a [&'b [f32]],
    outputs: &'a mut [&'b mut [f32]],
}

impl<'a, 'b> SplitBlock<'a, 'b> {
    pub fn new(inputs: &'a [&'b [f32]], outputs: &'a mut [&'b mut [f32]]) -> Self {
        Self { inputs, outputs }
    }
}

impl BlockIo for SplitBlock<'_, '_> {
    fn num_channels(&self) -> usize {
        self.inputs.len().min(self.outputs.len())
    }

    fn channel(&mut self, index: usize) -> Option<ChannelIo<'_>> {
        let input = *self.inputs.get(index)?;
        let output = self.outputs.get_mut(index)?;
        Some(ChannelIo::Split {
            input,
            output: &mut **output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_place_channel_reads_what_it_writes() {
        let mut a = [1.0f32, 2.0, 3.0];
        let mut b = [4.0f32, 5.0, 6.0];
        let mut chans: [&mut [f32]; 2] = [&mut a, &mut b];
        let mut block = InPlaceBlock::new(&mut chans);
        assert_eq!(block.num_channels(), 2);
        let mut ch = block.channel(1).unwrap();
        assert!(ch.is_in_place());
        ch.output()[0] = 9.0;
        assert_eq!(ch.input()[0], 9.0);
        assert!(block.channel(2).is_none());
    }

    #[test]
    fn test_split_channel_len_is_shorter_side() {
        let input = [0.5f32; 8];
        let mut out = [0.0f32; 6];
        let inputs: [&[f32]; 1] = [&input];
        let mut outputs: [&mut [f32]; 1] = [&mut out];
        let mut block = SplitBlock::new(&inputs, &mut outputs);
        let ch = block.channel(0).unwrap();
        assert!(!ch.is_in_place());
        assert_eq!(ch.len(), 6);
    }
}
